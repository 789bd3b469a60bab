//! Monster Scanner - turns photos of everyday objects into collectible monsters.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use monster_scanner::{
    cache::TtlCache,
    config::{CheckConfig, Cli, Command, ServeConfig, SignConfig, SignOutputFormat},
    inference::{HttpEndpoint, HttpImageAnalyzer, HttpImageSynthesizer, HttpSpeechSynthesizer},
    pipeline::ScanService,
    server::{auth::UrlSigner, create_router, RouterConfig},
    storage::{create_s3_client, MemoryBlobStore, MemoryRecordStore, S3BlobStore},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Sign(config) => run_sign(config),
        Command::Check(config) => run_check(config).await,
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

    print_banner();

    info!("Configuration:");
    match config.s3_bucket {
        Some(ref bucket) => {
            info!("  Storage: S3 bucket {}", bucket);
            if let Some(ref endpoint) = config.s3_endpoint {
                info!("  S3 endpoint: {}", endpoint);
            }
            info!("  S3 region: {}", config.s3_region);
        }
        None => {
            warn!("  Storage: in-memory, development only (unbounded, lost on restart)");
            info!("  Blob URLs: {}/blobs/...", config.public_base_url());
        }
    }

    if config.auth_enabled {
        info!("  Admin auth: enabled");
    } else {
        info!("  Admin auth: off - /admin endpoints are publicly accessible");
        info!("        Enable with: --auth-enabled=true --auth-secret=<secret>");
    }

    info!(
        "  Caches: {} scans for {}s, {} collections for {}s",
        config.scan_cache_entries,
        config.scan_cache_ttl,
        config.collection_cache_entries,
        config.collection_cache_ttl
    );
    info!(
        "  Max image size: {} KiB, fingerprint: {:?}",
        config.max_image_bytes / 1024,
        config.fingerprint_mode
    );

    let mut builder = ScanService::builder()
        .record_store(Arc::new(MemoryRecordStore::new()))
        .scan_cache(Arc::new(TtlCache::new(
            "scan",
            config.scan_cache_entries,
            config.scan_cache_ttl(),
        )))
        .collection_cache(Arc::new(TtlCache::new(
            "collection",
            config.collection_cache_entries,
            config.collection_cache_ttl(),
        )))
        .fingerprinter(config.fingerprinter())
        .settings(config.pipeline_settings());

    // Collaborators
    info!("");
    info!("Collaborators:");
    let client = match reqwest::Client::builder()
        .connect_timeout(monster_scanner::inference::DEFAULT_CONNECT_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match config.analyzer_url {
        Some(ref url) => {
            info!("  Analyzer: {} ({})", url, config.analyzer_model);
            let endpoint = HttpEndpoint::with_client(
                client.clone(),
                url,
                &config.analyzer_model,
                config.analyzer_api_key.clone(),
            );
            builder = builder.analyzer(Arc::new(HttpImageAnalyzer::new(endpoint)));
        }
        None => warn!("  Analyzer: not configured, scans will return 503"),
    }

    match config.synthesizer_url {
        Some(ref url) => {
            info!("  Synthesizer: {} ({})", url, config.synthesizer_model);
            let endpoint = HttpEndpoint::with_client(
                client.clone(),
                url,
                &config.synthesizer_model,
                config.synthesizer_api_key.clone(),
            );
            builder = builder.synthesizer(Arc::new(HttpImageSynthesizer::new(endpoint)));
        }
        None => warn!("  Synthesizer: not configured, scans will return 503"),
    }

    match config.speech_url {
        Some(ref url) => {
            info!("  Speech: {} ({})", url, config.speech_model);
            let endpoint = HttpEndpoint::with_client(
                client,
                url,
                &config.speech_model,
                config.speech_api_key.clone(),
            );
            builder = builder.speech_synthesizer(Arc::new(HttpSpeechSynthesizer::new(endpoint)));
        }
        None => info!("  Speech: not configured, records will have no narration"),
    }

    let mut router_config = build_router_config(&config);

    // Blob storage
    match config.s3_bucket {
        Some(ref bucket) => {
            let s3_client =
                create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;

            info!("");
            info!("Connecting to S3...");
            match test_s3_connection(&s3_client, bucket).await {
                Ok(()) => info!("  Connected successfully"),
                Err(e) => {
                    error!("  Failed to connect to S3: {}", e);
                    error!("");
                    error!("  Please check:");
                    error!("    - Your AWS credentials are configured correctly");
                    error!("    - The bucket '{}' exists and is accessible", bucket);
                    error!("    - The S3 endpoint is correct (if using MinIO/custom S3)");
                    return ExitCode::FAILURE;
                }
            }

            builder = builder.blob_store(Arc::new(S3BlobStore::new(
                s3_client,
                bucket,
                &config.s3_prefix,
            )));
        }
        None => {
            // Blob URLs only need to verify within this process
            let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
            let store = Arc::new(MemoryBlobStore::new(
                config.public_base_url(),
                UrlSigner::new(secret),
            ));
            builder = builder.blob_store(store.clone());
            router_config = router_config.with_blob_store(store);
        }
    }

    let service = Arc::new(builder.build());
    let router = create_router(service, router_config);

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!(
        "    curl -X POST http://{}/scan -H 'content-type: application/json' \\",
        addr
    );
    info!("         -d '{{\"image\":\"<base64>\",\"session_id\":\"demo\"}}'");
    info!("    curl http://{}/sessions/demo/monsters", addr);
    if !config.auth_enabled {
        info!("    curl http://{}/admin/cache/stats", addr);
    }
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Print the startup banner.
fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("");
    info!("███╗   ███╗ ██████╗ ███╗   ██╗███████╗████████╗███████╗██████╗ ");
    info!("████╗ ████║██╔═══██╗████╗  ██║██╔════╝╚══██╔══╝██╔════╝██╔══██╗");
    info!("██╔████╔██║██║   ██║██╔██╗ ██║███████╗   ██║   █████╗  ██████╔╝");
    info!("██║╚██╔╝██║██║   ██║██║╚██╗██║╚════██║   ██║   ██╔══╝  ██╔══██╗");
    info!("██║ ╚═╝ ██║╚██████╔╝██║ ╚████║███████║   ██║   ███████╗██║  ██║");
    info!("╚═╝     ╚═╝ ╚═════╝ ╚═╝  ╚═══╝╚══════╝   ╚═╝   ╚══════╝╚═╝  ╚═╝");
    info!("                         scanner v{}", version);
    info!("");
}

/// Check that the bucket exists and is reachable.
async fn test_s3_connection(client: &aws_sdk_s3::Client, bucket: &str) -> Result<(), String> {
    client
        .head_bucket()
        .bucket(bucket)
        .send()
        .await
        .map_err(|e| format!("{}", e))?;
    Ok(())
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "monster_scanner=debug,tower_http=debug"
    } else {
        "monster_scanner=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = if config.auth_enabled {
        RouterConfig::new(config.auth_secret_or_empty())
    } else {
        RouterConfig::without_auth()
    };

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
        .with_max_image_bytes(config.max_image_bytes)
        .with_redacted_errors(config.redact_errors)
        .with_tracing(!config.no_tracing)
}

// =============================================================================
// Sign Command
// =============================================================================

fn run_sign(config: SignConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let params = match config.parse_params() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let signer = UrlSigner::new(&config.secret);
    let ttl = Duration::from_secs(config.ttl);

    let params_ref: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let (signature, expiry) = signer.sign_with_params(&config.path, ttl, &params_ref);

    match config.format {
        SignOutputFormat::Signature => {
            println!("{}", signature);
        }
        SignOutputFormat::Json => {
            let url = config.base_url.as_ref().map(|base_url| {
                build_signed_url(base_url, &config.path, &params, expiry, &signature)
            });

            let json = serde_json::json!({
                "signature": signature,
                "expiry": expiry,
                "path": config.path,
                "ttl": config.ttl,
                "url": url,
            });
            match serde_json::to_string_pretty(&json) {
                Ok(text) => println!("{}", text),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
        SignOutputFormat::Url => {
            if let Some(ref base_url) = config.base_url {
                let url = build_signed_url(base_url, &config.path, &params, expiry, &signature);
                println!("{}", url);
            } else {
                let query = build_query_string(&params, expiry, &signature);
                println!("{}?{}", config.path, query);
                eprintln!();
                eprintln!("Tip: Use --base-url to generate a complete URL");
            }
        }
    }

    ExitCode::SUCCESS
}

/// Build a complete signed URL.
fn build_signed_url(
    base_url: &str,
    path: &str,
    params: &[(String, String)],
    expiry: u64,
    signature: &str,
) -> String {
    let base_url = base_url.trim_end_matches('/');
    let query = build_query_string(params, expiry, signature);
    format!("{}{}?{}", base_url, path, query)
}

/// Build the query string with expiry and signature.
fn build_query_string(params: &[(String, String)], expiry: u64, signature: &str) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in params {
        serializer.append_pair(k, v);
    }
    serializer.append_pair("exp", &expiry.to_string());
    serializer.append_pair("sig", signature);
    serializer.finish()
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("Monster Scanner Configuration Check");
    println!("════════════════════════════════════");
    println!();

    let mut failed = false;

    // Storage
    match config.s3_bucket {
        Some(ref bucket) => {
            println!("✓ Bucket: {}", bucket);
            if let Some(ref endpoint) = config.s3_endpoint {
                println!("✓ Endpoint: {}", endpoint);
            }
            println!("✓ Region: {}", config.s3_region);
            print!("Testing S3 connection... ");

            let s3_client =
                create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;
            match test_s3_connection(&s3_client, bucket).await {
                Ok(()) => println!("✓ success"),
                Err(e) => {
                    println!("✗ failed");
                    println!("  Error: {}", e);
                    println!("  Please check:");
                    println!("    - Your AWS credentials are configured correctly");
                    println!("    - The bucket '{}' exists and is accessible", bucket);
                    if config.s3_endpoint.is_some() {
                        println!("    - The S3 endpoint is correct and reachable");
                    }
                    failed = true;
                }
            }
        }
        None => println!("- Bucket: not set, assets will be kept in memory"),
    }
    println!();

    // Collaborators
    let client = match reqwest::Client::builder()
        .connect_timeout(monster_scanner::inference::DEFAULT_CONNECT_TIMEOUT)
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            println!("✗ Failed to build HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    for (name, url, required) in config.collaborators() {
        let Some(url) = url else {
            if required {
                println!("✗ {}: not configured (required)", name);
                failed = true;
            } else {
                println!("- {}: not configured (optional)", name);
            }
            continue;
        };

        if let Err(e) = CheckConfig::validate_url(name, url) {
            println!("✗ {}: {}", name, e);
            failed = true;
            continue;
        }

        // Any HTTP answer means the host is reachable
        print!("Testing {} at {}... ", name, url);
        match client.get(url).send().await {
            Ok(response) => println!("✓ reachable (HTTP {})", response.status().as_u16()),
            Err(e) => {
                println!("✗ unreachable");
                println!("  Error: {}", e);
                failed = true;
            }
        }
    }

    println!();
    println!("════════════════════════════════════");
    if failed {
        println!("✗ Some checks failed");
        ExitCode::FAILURE
    } else {
        println!("✓ All checks passed!");
        ExitCode::SUCCESS
    }
}
