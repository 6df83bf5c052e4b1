//! wallstitch - seamless wallpapers from slippy-map satellite tiles.
//!
//! This binary runs the HTTP server or renders a single wallpaper to a file.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wallstitch::{
    cache::{DiskStore, RenderCache},
    config::{Cli, Command, EngineArgs, RenderConfig, ServeConfig},
    fetch::{HttpTileSource, TileFetcher},
    render::WallpaperService,
    server::{create_router, RouterConfig},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Render(config) => run_render(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("wallstitch v{}", env!("CARGO_PKG_VERSION"));
    log_engine(&config.engine);

    let service = match build_service(&config.engine).await {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!("Failed to start render engine: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let router = create_router(service, build_router_config(&config));
    let addr = config.bind_address();

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Cannot listen on {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Listening on http://{}", addr);
    info!(
        "Example: curl -o richat.jpg 'http://{}/render?lat=21.1269&lon=-11.4016&zoom=12&width=1080&height=1920'",
        addr
    );

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server stopped: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_jpeg_quality(config.jpeg_quality)
        .with_tracing(!config.no_tracing);

    match &config.cors_origins {
        Some(origins) => router_config.with_cors_origins(origins.clone()),
        None => router_config,
    }
}

// =============================================================================
// Render Command
// =============================================================================

async fn run_render(config: RenderConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let (request, format) = match (config.to_request(), config.export_format()) {
        (Ok(request), Ok(format)) => (request, format),
        (Err(e), _) | (_, Err(e)) => {
            error!("Invalid render request: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let service = match build_service(&config.engine).await {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to start render engine: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        center = %request.viewport.center,
        zoom = request.viewport.zoom,
        width = request.viewport.output.width,
        height = request.viewport.output.height,
        resolution = %config.resolution,
        "Rendering"
    );

    let (result, bytes) = match service.render_export(&request, format).await {
        Ok(rendered) => rendered,
        Err(e) => {
            error!("Render failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    service.cache().flush().await;

    if result.failed_tiles > 0 {
        warn!(
            "{} of {} tiles failed and were left black",
            result.failed_tiles, result.tile_count
        );
    }

    if let Err(e) = tokio::fs::write(&config.output, &bytes).await {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    info!(
        "Wrote {} ({}x{}, {}, {} bytes)",
        config.output.display(),
        result.image.width(),
        result.image.height(),
        format,
        bytes.len()
    );
    ExitCode::SUCCESS
}

// =============================================================================
// Shared Setup
// =============================================================================

/// Assemble the render service from engine settings.
async fn build_service(engine: &EngineArgs) -> Result<WallpaperService<HttpTileSource>, String> {
    let template = engine.url_template()?;
    let source =
        HttpTileSource::with_config(template, engine.http_config()).map_err(|e| e.to_string())?;
    let fetcher = TileFetcher::with_options(source, engine.tile_cache_entries, engine.parallelism);

    let mut cache = RenderCache::with_capacity(engine.render_cache_entries);
    if let Some(dir) = &engine.disk_cache_dir {
        let store = DiskStore::open(dir.clone())
            .await
            .map_err(|e| format!("cannot open disk cache {}: {}", dir.display(), e))?;
        cache = cache.with_durable(Arc::new(store), engine.disk_cache_entries);
        match cache.prune().await {
            Ok(0) => {}
            Ok(removed) => info!("  Pruned {} stale disk cache entries", removed),
            Err(e) => warn!("  Disk cache prune failed: {}", e),
        }
    }

    Ok(WallpaperService::with_components(
        fetcher,
        cache,
        engine.zoom_range(),
    ))
}

fn log_engine(engine: &EngineArgs) {
    info!("Configuration:");
    info!("  Tile URL: {}", engine.tile_url);
    info!("  Zoom range: {}..={}", engine.min_zoom, engine.max_zoom);
    info!(
        "  Fetching: {} parallel, {}s connect / {}s read timeout",
        engine.parallelism, engine.connect_timeout_secs, engine.read_timeout_secs
    );
    info!(
        "  Cache: {} tiles, {} renders in memory",
        engine.tile_cache_entries, engine.render_cache_entries
    );
    match &engine.disk_cache_dir {
        Some(dir) => info!(
            "  Disk cache: {} ({} renders)",
            dir.display(),
            engine.disk_cache_entries
        ),
        None => info!("  Disk cache: disabled"),
    }
}

/// Install the fmt subscriber. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wallstitch={level},tower_http={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(verbose))
        .init();
}
