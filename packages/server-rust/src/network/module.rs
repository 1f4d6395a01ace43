//! HTTP server lifecycle with deferred startup.
//!
//! `new()` allocates shared state, `start()` binds the listener and `serve()`
//! accepts requests until the shutdown future resolves.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::{NetworkConfig, TlsConfig};
use super::handlers::{
    api_info_handler, api_versions_handler, configured_devices_handler, description_handler,
    device_handler, health_handler, liveness_handler, not_found_handler, readiness_handler,
    reload_handler, root_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::service::DeviceService;

/// How long shutdown waits for in-flight requests.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Assembles every route and the middleware stack.
///
/// Routes:
/// - `GET|PUT /api/v1/{device_type}/{device_number}/{member}` -- device API
/// - `GET /management/apiversions`, `/management/v1/description`,
///   `/management/v1/configureddevices` -- discovery
/// - `GET|PUT /reload` -- re-read the configuration
/// - `GET /`, `GET /api/v1` -- server info
/// - `GET /health`, `/health/live`, `/health/ready` -- health checks
///
/// Anything else answers 400.
pub fn build_router(state: AppState, config: &NetworkConfig) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/api/v1", get(api_info_handler))
        .route(
            "/api/v1/{device_type}/{device_number}/{member}",
            get(device_handler).put(device_handler),
        )
        .route("/management/apiversions", get(api_versions_handler))
        .route("/management/v1/description", get(description_handler))
        .route(
            "/management/v1/configureddevices",
            get(configured_devices_handler),
        )
        .route("/reload", get(reload_handler).put(reload_handler))
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .fallback(not_found_handler)
        .layer(build_http_layers(config))
        .with_state(state)
}

/// Owns the listener and the shared state behind the router.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    service: DeviceService,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, service: DeviceService) -> Self {
        Self {
            config,
            listener: None,
            service,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Binds the configured address and returns the bound port.
    ///
    /// Port 0 asks the OS for an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves, then drains.
    ///
    /// After the signal the health state moves to `Draining`, running
    /// exposures are cancelled and in-flight requests get up to 30 seconds to
    /// finish.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called, if TLS material cannot be
    /// loaded, or if the server hits a fatal I/O error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Some(listener) = self.listener else {
            anyhow::bail!("start() must be called before serve()");
        };
        let service = self.service;
        let shutdown_ctrl = self.shutdown;
        let config = self.config;

        let state = AppState {
            service: service.clone(),
            shutdown: Arc::clone(&shutdown_ctrl),
            start_time: Instant::now(),
        };
        let router = build_router(state, &config);

        shutdown_ctrl.set_ready();

        if let Some(ref tls_config) = config.tls {
            serve_tls(listener, router, tls_config, shutdown).await?;
        } else {
            serve_plain(listener, router, shutdown).await?;
        }

        drain(&service, &shutdown_ctrl).await;
        Ok(())
    }
}

async fn serve_plain(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!("serving plain HTTP");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Serves HTTPS through `axum-server` on the pre-bound listener.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls_config: &TlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls_config.cert_path, &tls_config.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(None);
    });

    info!(%addr, "serving HTTPS");

    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

async fn drain(service: &DeviceService, shutdown_ctrl: &ShutdownController) {
    shutdown_ctrl.trigger_shutdown();
    service.shutdown();

    if shutdown_ctrl.wait_for_drain(DRAIN_TIMEOUT).await {
        info!("all requests drained");
    } else {
        warn!(
            in_flight = shutdown_ctrl.in_flight_count(),
            "drain timeout expired with requests remaining"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::handlers::tests::test_state;
    use crate::network::HealthState;

    fn module() -> NetworkModule {
        let config = NetworkConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..NetworkConfig::default()
        };
        NetworkModule::new(config, test_state().service)
    }

    #[test]
    fn new_does_not_bind() {
        let module = module();
        assert!(module.listener.is_none());
        assert_eq!(module.shutdown_controller().health_state(), HealthState::Starting);
    }

    #[tokio::test]
    async fn start_binds_ephemeral_port() {
        let mut module = module();
        let port = module.start().await.unwrap();
        assert!(port > 0);
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let err = module().serve(std::future::pending::<()>()).await.unwrap_err();
        assert!(err.to_string().contains("start()"));
    }

    #[tokio::test]
    async fn serve_until_shutdown_then_stop() {
        let mut module = module();
        module.start().await.unwrap();
        let controller = module.shutdown_controller();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(module.serve(async move {
            let _ = rx.await;
        }));

        for _ in 0..100 {
            if controller.health_state() == HealthState::Ready {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(controller.health_state(), HealthState::Ready);

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
        assert_eq!(controller.health_state(), HealthState::Stopped);
    }
}
