//! Per-connection WebSocket protocol.
//!
//! On connect the client receives a full dashboard snapshot followed by an
//! initial chart window. Afterwards the connection forwards broadcast frames
//! and answers the client's own plot-window requests, so each connection can
//! browse history independently while the shared stream keeps flowing.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::{DateTime, Duration, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ingest::aggregate::{
    active_run_window, build_snapshot, plot_data, AnomalyStatus, PlotData,
};
use crate::ingest::messages::parse_timestamp_str;
use crate::state::AppState;

use super::broadcaster::DashboardFrame;

/// Span of the initial chart window when the motor is running.
const LIVE_WINDOW_MINUTES: i64 = 10;

/// `end_time` sentinel asking for a window ending now that keeps following
/// new data.
const LIVE_SENTINEL: &str = "live";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientRequest {
    /// Ask for chart data over an explicit window, or a live window when
    /// `end_time` is `"live"` or absent.
    RequestPlotData {
        start_time: Option<String>,
        end_time: Option<String>,
    },
    /// Re-send the snapshot and initial chart window.
    RequestInitialData,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PlotResponse {
    PlotDataUpdate {
        plot_type: &'static str,
        data: PlotData,
        live_mode_active: bool,
    },
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut rx = state.broadcaster.subscribe();

    if send_initial(&mut sink, &state).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            frame = rx.recv() => {
                match frame {
                    Ok(frame) => {
                        if send_json(&mut sink, &frame).await.is_err() {
                            break;
                        }
                    }
                    // Lagged: this client missed frames while slow. The next
                    // snapshot is self-contained, so just keep going.
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!(missed = n, "WebSocket client lagged behind broadcasts");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if handle_request(&mut sink, &state, &text).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        }
    }
}

/// First paint: the latest snapshot plus a chart window chosen from the run
/// log. An open run streams live from its start; a finished run shows that
/// run; no run at all falls back to the trailing live window.
async fn send_initial(
    sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    state: &AppState,
) -> anyhow::Result<()> {
    let snapshot = match state.broadcaster.latest_snapshot().await {
        Some(snapshot) => snapshot,
        None => {
            let status = AnomalyStatus {
                detected: true,
                message: "Insufficient or stale data for anomaly detection.".to_owned(),
            };
            build_snapshot(state.repo.as_ref(), status).await?
        }
    };
    send_json(sink, &DashboardFrame::DashboardUpdate { message: snapshot }).await?;

    let now = Utc::now();
    let (plot_type, start, end, live_mode) = match active_run_window(state.repo.as_ref()).await? {
        Some((start, None)) => ("initial_live_10_min", start, now, true),
        Some((start, Some(end))) => ("initial_historical", start, end, false),
        None => (
            "initial_live_10_min",
            now - Duration::minutes(LIVE_WINDOW_MINUTES),
            now,
            true,
        ),
    };
    send_plot(sink, state, plot_type, start, end, live_mode).await
}

async fn handle_request(
    sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    state: &AppState,
    text: &str,
) -> anyhow::Result<()> {
    let request: ClientRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed WebSocket request");
            return Ok(());
        }
    };

    match request {
        ClientRequest::RequestInitialData => send_initial(sink, state).await,
        ClientRequest::RequestPlotData { start_time, end_time } => {
            let now = Utc::now();
            let live_mode = match end_time.as_deref() {
                None | Some(LIVE_SENTINEL) => true,
                Some(_) => false,
            };
            let end = if live_mode {
                now
            } else {
                parse_client_time(end_time.as_deref()).unwrap_or(now)
            };
            let start = parse_client_time(start_time.as_deref())
                .unwrap_or(end - Duration::minutes(LIVE_WINDOW_MINUTES));
            let plot_type = if live_mode {
                "initial_live_10_min"
            } else {
                "historical_range"
            };
            send_plot(sink, state, plot_type, start, end, live_mode).await
        }
    }
}

async fn send_plot(
    sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    state: &AppState,
    plot_type: &'static str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    live_mode_active: bool,
) -> anyhow::Result<()> {
    let data = plot_data(state.repo.as_ref(), start, end).await?;
    send_json(
        sink,
        &PlotResponse::PlotDataUpdate {
            plot_type,
            data,
            live_mode_active,
        },
    )
    .await
}

fn parse_client_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(parse_timestamp_str)
}

async fn send_json<T: Serialize>(
    sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    value: &T,
) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|e| anyhow::anyhow!("WebSocket send failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plot_request_decodes_live_sentinel() {
        let request: ClientRequest = serde_json::from_str(
            r#"{"type": "request_plot_data", "start_time": "2024-05-01T10:00:00", "end_time": "live"}"#,
        )
        .unwrap();
        match request {
            ClientRequest::RequestPlotData { end_time, .. } => {
                assert_eq!(end_time.as_deref(), Some(LIVE_SENTINEL));
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn initial_data_request_decodes() {
        let request: ClientRequest =
            serde_json::from_str(r#"{"type": "request_initial_data"}"#).unwrap();
        assert!(matches!(request, ClientRequest::RequestInitialData));
    }

    #[test]
    fn plot_update_serializes_with_snake_case_tag() {
        let response = PlotResponse::PlotDataUpdate {
            plot_type: "historical_range",
            data: PlotData::default(),
            live_mode_active: false,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "plot_data_update");
        assert_eq!(json["plot_type"], "historical_range");
        assert_eq!(json["live_mode_active"], false);
    }
}
