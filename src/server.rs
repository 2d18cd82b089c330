use actix_cors::Cors;
use actix_multipart::Multipart;
use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder};
use clap::Parser;
use futures::{StreamExt, TryStreamExt};
use log::{error, info};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use maps_scraper_lib::config::{TabMode, BASE_URL};
use maps_scraper_lib::locators::Locators;
use maps_scraper_lib::page::{MapsPage, PageProvisioner};
use maps_scraper_lib::protocol::Request;
use maps_scraper_lib::{delay_manager, input_loader, logger, search};
use maps_scraper_lib::{ChromeProvisioner, ContextHost, ScraperConfig};

#[derive(Parser)]
#[command(name = "server", about = "HTTP control surface for the maps scraper")]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
}

struct AppState {
    host: Arc<ContextHost>,
}

#[get("/api/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json("Server is running")
}

#[post("/api/message")]
async fn message(body: web::Json<Request>, data: web::Data<AppState>) -> impl Responder {
    let host = Arc::clone(&data.host);
    let request = body.into_inner();
    match web::block(move || host.handle(request)).await {
        Ok(reply) => HttpResponse::Ok().json(reply),
        Err(e) => {
            error!("Message handler failed: {}", e);
            HttpResponse::InternalServerError().json("Message handler failed")
        }
    }
}

#[get("/api/events")]
async fn events(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(data.host.recent_events())
}

#[get("/api/batch")]
async fn batch_status(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(data.host.batch_progress())
}

/// Accepts a terms file and starts a batch over it.
#[post("/api/batch/upload")]
async fn upload_terms(mut payload: Multipart, data: web::Data<AppState>) -> impl Responder {
    let upload_dir = PathBuf::from("uploads");
    if let Err(e) = std::fs::create_dir_all(&upload_dir) {
        error!("Could not create upload directory: {}", e);
        return HttpResponse::InternalServerError().json("Could not store upload");
    }

    let upload_id = Uuid::new_v4().to_string();
    let mut saved: Option<PathBuf> = None;

    while let Ok(Some(mut field)) = payload.try_next().await {
        let content_disposition = field.content_disposition();
        if content_disposition.get_name().unwrap_or("") != "file" {
            continue;
        }
        let extension = match content_disposition.get_filename() {
            Some(name) if name.to_ascii_lowercase().ends_with(".xlsx") => "xlsx",
            _ => "csv",
        };
        let file_path = upload_dir.join(format!("{}.{}", upload_id, extension));

        let mut f = match std::fs::File::create(&file_path) {
            Ok(f) => f,
            Err(e) => {
                error!("Could not create {:?}: {}", file_path, e);
                return HttpResponse::InternalServerError().json("Could not store upload");
            }
        };
        while let Some(chunk) = field.next().await {
            let written = chunk
                .map_err(|e| e.to_string())
                .and_then(|bytes| f.write_all(&bytes).map_err(|e| e.to_string()));
            if let Err(e) = written {
                error!("Upload {} failed: {}", upload_id, e);
                return HttpResponse::BadRequest().json("Upload interrupted");
            }
        }
        saved = Some(file_path);
    }

    let Some(file_path) = saved else {
        return HttpResponse::BadRequest().json("Expected a 'file' field");
    };
    let terms = input_loader::load_terms(&file_path);
    if terms.is_empty() {
        return HttpResponse::BadRequest().json("No search terms found in upload");
    }
    let total = terms.len();

    let host = Arc::clone(&data.host);
    let reply = web::block(move || {
        host.handle(Request::StartBatchScrape {
            business_types: terms,
        })
    })
    .await;

    match reply {
        Ok(reply) => HttpResponse::Ok().json(serde_json::json!({
            "upload_id": upload_id,
            "total": total,
            "result": reply,
        })),
        Err(e) => {
            error!("Batch start failed: {}", e);
            HttpResponse::InternalServerError().json("Batch start failed")
        }
    }
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logger::init(args.verbose);

    let config = ScraperConfig::load(args.config.as_deref())?;
    let provisioner = Arc::new(ChromeProvisioner::launch(&config.browser)?);
    let page: Arc<dyn MapsPage> = Arc::new(provisioner.open(BASE_URL, TabMode::Foreground)?);
    page.wait_until_loaded()?;
    search::accept_consent(page.as_ref(), &Locators::GOOGLE_MAPS, config.timings.consent_settle);
    delay_manager::settle(config.timings.page_init_settle, "page load");

    let provisioner: Arc<dyn PageProvisioner> = provisioner;
    let host = Arc::new(ContextHost::new(page, provisioner, &config));
    let state = web::Data::new(AppState { host });

    info!("Starting Web Server at http://{}", config.bind);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .service(health_check)
            .service(message)
            .service(events)
            .service(batch_status)
            .service(upload_terms)
    })
    .bind(config.bind.as_str())?
    .run()
    .await?;
    Ok(())
}
