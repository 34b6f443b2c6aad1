use actix_web::{http::header::ContentType, middleware::Logger, web, App, HttpResponse, HttpServer};
use bank_data_scraping_utils::{credentials::Credentials, fs_json_util::read_json};
use log::{error, info};
use tokio::sync::Mutex;

use crate::{
    auth::GoCardlessAuthenticator,
    clock::SystemClock,
    config::Config,
    handler::{Handler, HandlerSettings, Outcome, AUTHENTICATION_FAILED, DOWNLOAD_FAILED},
    store::Store,
    transactions::HttpTransactionFetcher,
};

type AppHandler = Handler<Store, SystemClock, GoCardlessAuthenticator, HttpTransactionFetcher>;

struct State {
    handler: AppHandler,
    /// Invocations in this process run one at a time.
    /// Other processes sharing the store are not excluded.
    running: Mutex<()>,
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    let credentials: Credentials = read_json(&config.credentials_path)?;
    let settings = HandlerSettings::builder()
        .rate_limit_key(config.keys.last_request_time.clone())
        .rate_limit_interval(config.rate_limit_interval()?)
        .session_key(config.keys.session.clone())
        .session_ttl(config.session_ttl()?)
        .transaction_limit(config.transaction_limit)
        .build();
    let handler = Handler::new(
        Store::open(&config.store)?,
        SystemClock,
        GoCardlessAuthenticator::new(config.upstream.clone(), credentials),
        HttpTransactionFetcher::new(config.transactions_url.clone()),
        settings,
    );
    let state = web::Data::new(State {
        handler,
        running: Mutex::new(()),
    });

    let route = config.route.clone();
    info!("Serving {route} on {}:{}", config.bind, config.port);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route(&route, web::route().to(transactions))
            .wrap(Logger::default())
    })
    .bind((config.bind.as_str(), config.port))?
    .run()
    .await?;
    info!("The server has shut down.");
    Ok(())
}

async fn transactions(state: web::Data<State>) -> HttpResponse {
    let _running = state.running.lock().await;
    respond(state.handler.handle().await)
}

pub fn respond(result: anyhow::Result<Outcome>) -> HttpResponse {
    match result {
        Ok(Outcome::Success(result)) => HttpResponse::Ok().json(result),
        Ok(Outcome::AuthenticationFailed) => HttpResponse::Unauthorized()
            .content_type(ContentType::plaintext())
            .body(AUTHENTICATION_FAILED),
        Ok(Outcome::DownloadFailed) => HttpResponse::InternalServerError()
            .content_type(ContentType::plaintext())
            .body(DOWNLOAD_FAILED),
        Err(e) => {
            error!("{e:#}");
            HttpResponse::InternalServerError()
                .content_type(ContentType::plaintext())
                .body(format!("{e:#}"))
        }
    }
}
