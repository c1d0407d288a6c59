use crate::bridge::model::DetectionModel;
use crate::generator::scene::{build_det_matrix, GeneratorConfig};
use crate::workflow::runner::Runner;
use cfarcore::dpif::ControlCommand;
use cfarcore::CfarError;
use log::{info, warn};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::RwLock;
use warp::{http::StatusCode, Filter};

pub fn bridge_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

type SharedModel = Arc<RwLock<DetectionModel>>;

/// Status code of the core error behind `err`, if there is one.
fn status_code(err: &anyhow::Error) -> Option<i32> {
    err.downcast_ref::<CfarError>().map(CfarError::code)
}

fn failure(err: &anyhow::Error) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&json!({
            "status": "error",
            "code": status_code(err),
            "message": format!("{err:#}"),
        })),
        StatusCode::BAD_REQUEST,
    )
}

/// HTTP bridge exposing the latest detections and accepting control commands.
#[derive(Clone)]
pub struct DetectionBridge {
    state: SharedModel,
    runner: Arc<Runner>,
}

impl DetectionBridge {
    pub fn new(runner: Arc<Runner>) -> Self {
        Self {
            state: Arc::new(RwLock::new(DetectionModel::default())),
            runner,
        }
    }

    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let state = self.state.clone();
        let state_filter = warp::any().map(move || state.clone());
        let runner = self.runner.clone();
        let runner_filter = warp::any().map(move || runner.clone());

        let get_route = warp::path("payload")
            .and(warp::path::end())
            .and(warp::get())
            .and(state_filter.clone())
            .and_then(|state: SharedModel| async move {
                let model = state.read().await.clone();
                Ok::<_, warp::Rejection>(warp::reply::json(&model))
            });

        let generator_route = warp::path("ingest-config")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::json())
            .and(state_filter)
            .and(runner_filter.clone())
            .and_then(
                |config: GeneratorConfig, state: SharedModel, runner: Arc<Runner>| async move {
                    let workflow = runner.config();
                    let outcome = match build_det_matrix(
                        &config,
                        workflow.range_bins,
                        workflow.doppler_bins,
                    ) {
                        Ok(matrix) => runner.execute(&matrix).await,
                        Err(err) => Err(err),
                    };
                    let reply = match outcome {
                        Ok(result) => {
                            let count = result.detections.len();
                            *state.write().await =
                                DetectionModel::from_result(&result, config.scenario.clone());
                            if let Some(name) = config.scenario.as_ref() {
                                info!("scenario {name} -> detections {count}");
                            }
                            warp::reply::with_status(
                                warp::reply::json(&json!({
                                    "status": "ok",
                                    "detections": count,
                                    "description": config.description.clone().unwrap_or_default()
                                })),
                                StatusCode::OK,
                            )
                        }
                        Err(err) => {
                            warn!("ingest-config error: {err:#}");
                            failure(&err)
                        }
                    };
                    Ok::<_, warp::Rejection>(reply)
                },
            );

        let control_route = warp::path("control")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::json())
            .and(runner_filter)
            .and_then(|command: ControlCommand, runner: Arc<Runner>| async move {
                let reply = match runner.control(command).await {
                    Ok(()) => warp::reply::with_status(
                        warp::reply::json(&json!({"status": "ok"})),
                        StatusCode::OK,
                    ),
                    Err(err) => {
                        warn!("control error: {err:#}");
                        failure(&err)
                    }
                };
                Ok::<_, warp::Rejection>(reply)
            });

        get_route.or(generator_route).or(control_route)
    }

    pub async fn serve(self, addr: SocketAddr) {
        info!("bridge listening on http://{addr}");
        warp::serve(self.routes()).run(addr).await;
    }

    pub async fn publish(&self, model: DetectionModel) {
        info!(
            "frame {}: {} detection(s)",
            model.frame,
            model.detections.len()
        );
        *self.state.write().await = model;
    }

    pub fn publish_status(&self, message: &str) {
        info!("[bridge] {message}");
    }

    #[cfg(test)]
    pub async fn snapshot(&self) -> DetectionModel {
        self.state.read().await.clone()
    }
}
