// apiserver.rs

use askama::Template;
use axum::{
    Json, Router,
    body::Body,
    extract::{Form, State},
    http::{Response, StatusCode, header},
    response::{Html, IntoResponse},
    routing::*,
};
use embedded_svc::http::client::Client as HttpClient;
use esp_idf_svc::{http::client::EspHttpConnection, io, ota::EspOta};

use crate::*;

type AppState = Arc<Pin<Box<AirKitState>>>;

pub async fn run_api_server(state: AppState) -> anyhow::Result<()> {
    loop {
        if *state.wifi_up.read().await {
            break;
        }
        sleep(hardware::TIMER1).await;
    }

    let listen = format!("0.0.0.0:{}", api_port());
    let addr = listen.parse::<net::SocketAddr>()?;

    let app = Router::new()
        .route("/", get(get_index))
        .route("/form.js", get(get_formjs))
        .route("/index.css", get(get_indexcss))
        .route("/uptime", get(get_uptime))
        .route("/temp", get(get_temp))
        .route(
            "/config",
            get(get_config).post(post_config).options(options),
        )
        .route("/reset_config", get(reset_config))
        .route("/fw", post(update_fw).options(options))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening to {listen}");
    Ok(axum::serve(listener, app.into_make_service()).await?)
}

pub async fn options(State(state): State<AppState>) -> Response<Body> {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} options()");

    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "get,post"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "content-type"),
        ],
    )
        .into_response()
}

pub async fn get_index(State(state): State<AppState>) -> Response<Body> {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_index()");

    let config = state.config.read().await.clone();
    let temps = state.data.read().await.clone();
    let myid = state.myid.read().await.clone();
    let page = IndexPage {
        myid: &myid,
        fw_version: FW_VERSION,
        ota_slot: &state.ota_slot,
        config: &config,
        temps: &temps,
    };

    match page.render() {
        Ok(s) => (StatusCode::OK, Html(s)).into_response(),
        Err(e) => {
            let err_msg = format!("Index template error: {e:?}\n");
            error!("{err_msg}");
            (StatusCode::INTERNAL_SERVER_ERROR, err_msg).into_response()
        }
    }
}

pub async fn get_formjs(State(state): State<AppState>) -> Response<Body> {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_formjs()");

    let formjs = include_bytes!("form.js");
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/javascript")],
        formjs.to_vec(),
    )
        .into_response()
}

pub async fn get_indexcss(State(state): State<AppState>) -> Response<Body> {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_indexcss()");

    let indexcss = include_bytes!("index.css");
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        indexcss.to_vec(),
    )
        .into_response()
}

pub async fn get_uptime(State(state): State<AppState>) -> (StatusCode, Json<Uptime>) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_uptime()");

    let uptime = *state.uptime.read().await;
    (
        StatusCode::OK,
        Json(Uptime {
            uptime,
            uptime_s: uptime_string(uptime),
        }),
    )
}

pub async fn get_temp(State(state): State<AppState>) -> (StatusCode, Json<TempValues>) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_temp()");

    let ret = state.data.read().await.clone();
    (StatusCode::OK, Json(ret))
}

pub async fn get_config(State(state): State<AppState>) -> (StatusCode, Json<AirKitConfig>) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_conf()");
    (StatusCode::OK, Json(state.config.read().await.clone()))
}

pub async fn post_config(
    State(state): State<AppState>,
    Json(mut config): Json<AirKitConfig>,
) -> (StatusCode, String) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} set_conf()");

    if let Err(e) = config.validate() {
        let msg = format!("Config error: {e}");
        error!("{msg}");
        return (StatusCode::BAD_REQUEST, msg);
    }

    // mac belongs to the hardware, not to the client
    config.mac = state.config.read().await.mac;

    info!("Saving new config to eeprom...");
    Box::pin(save_conf(state, config)).await
}

pub async fn reset_config(State(state): State<AppState>) -> (StatusCode, String) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} reset_conf()");

    info!("Saving default config to eeprom...");
    Box::pin(save_conf(state, AirKitConfig::default())).await
}

async fn save_conf(state: AppState, config: AirKitConfig) -> (StatusCode, String) {
    let mut store = state.store.write().await;
    match store.save(&config) {
        Ok(_) => {
            info!("Config saved to eeprom. Resetting soon...");
            *state.config.write().await = config;
            *state.reset.write().await = true;
            (StatusCode::OK, "OK".to_string())
        }
        Err(e) => {
            let msg = format!("Eeprom write error: {e}");
            error!("{msg}");
            (StatusCode::INTERNAL_SERVER_ERROR, msg)
        }
    }
}

async fn update_fw(State(state): State<AppState>, Form(fw_update): Form<UpdateFirmware>) -> Response<Body> {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} update_fw()");

    info!("Firmware update: \n{fw_update:#?}");
    if !fw_update.url.starts_with("http://") {
        return StatusCode::BAD_REQUEST.into_response();
    }

    match flash_firmware(&fw_update.url) {
        Ok(()) => {
            info!("Update done. Restarting...");
            *state.reset.write().await = true;
            (StatusCode::OK, "OK").into_response()
        }
        Err(e) => {
            let msg = format!("Firmware update failed: {e:#}");
            error!("{msg}");
            (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
        }
    }
}

fn flash_firmware(url: &str) -> anyhow::Result<()> {
    let mut ota = EspOta::new()?;
    let mut client = HttpClient::wrap(EspHttpConnection::new(&Default::default())?);

    let req = client.get(url)?;
    let resp = req.submit()?;
    if resp.status() != StatusCode::OK {
        bail!("HTTP status {}", resp.status());
    }

    let mut update = ota.initiate_update()?;
    let mut buffer = [0_u8; 8192];
    if let Err(e) = io::utils::copy(resp, &mut update, &mut buffer) {
        update.abort()?;
        bail!("Download error: {e:?}");
    }
    update.complete()?;
    Ok(())
}

// EOF
