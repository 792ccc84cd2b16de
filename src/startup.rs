use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::auth::{Cryptography, Tokenization};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{health_check, me, refresh, sign_in, sign_out, sign_up};
use crate::session::SessionService;

const REFRESH_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Must be called from within a tokio runtime
pub fn run(listener: TcpListener, sessions: SessionService) -> Result<Server, std::io::Error> {
    let sessions = web::Data::new(sessions);
    spawn_refresh_sweeper(sessions.clone().into_inner(), REFRESH_SWEEP_INTERVAL);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(LoggerMiddleware)
            .app_data(sessions.clone())
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/auth")
                    .route("/signup", web::post().to(sign_up))
                    .route("/signin", web::post().to(sign_in))
                    .route("/refresh", web::post().to(refresh))
                    // Protected routes (require bearer access token)
                    .service(
                        web::resource("/signout")
                            .wrap(JwtMiddleware::new(sessions.clone()))
                            .route(web::post().to(sign_out)),
                    )
                    .service(
                        web::resource("/me")
                            .wrap(JwtMiddleware::new(sessions.clone()))
                            .route(web::get().to(me)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

/// Periodically drop refresh records that expired without being redeemed
pub fn spawn_refresh_sweeper<C, T>(
    sessions: Arc<SessionService<C, T>>,
    period: Duration,
) -> JoinHandle<()>
where
    C: Cryptography + 'static,
    T: Tokenization + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            sessions.purge_expired_refresh();
        }
    })
}
