use std::{io::Write, path::PathBuf, sync::Arc};

use clap::{command, Parser};
use llmkernel::{
    config::KernelConfig,
    engine::{
        openai_compat::OpenAICompatEngine, scripted::ScriptedEngine, ModelEngine, ENGINE_PACKAGE,
    },
    event::event_bus::Event,
    extension::PLUGIN_ID,
    federation::{FederationContainer, HostApp, HostCapabilities, SharedContext, SharedRegistry, INDEX_MODULE},
    kernel::{
        dispatch,
        protocol::{ExecuteRequest, MessageHeader, ShutdownRequest},
        ChannelContext, KernelContext, KernelOutput, KernelSpecRegistry,
    },
    settings::{InMemorySettingRegistry, DEFAULT_MODEL_KEY},
    Error,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "llmkernel.json")]
    config: PathBuf,

    /// Default model, as if set in the host settings
    #[arg(short, long)]
    model: Option<String>,

    /// Answer with the built-in echo engine instead of a model server
    #[arg(long)]
    offline: bool,

    /// Enable debug mode
    #[arg(short, long)]
    verbose: bool,
}

fn print_output(output: KernelOutput) {
    match output {
        KernelOutput::Stream { content, .. } => {
            print!("{}", content.text);
            let _ = std::io::stdout().flush();
        }
        KernelOutput::ExecuteError { content, .. } => {
            eprintln!("{}: {}", content.ename, content.evalue);
        }
    }
}

async fn run(cli: &Cli) -> Result<(), Error> {
    let config = KernelConfig::load_or_default(&cli.config)?;
    info!("config loaded.");
    // api_key is redacted by its Debug impl
    debug!("config: {:?}", config);

    let engine: Arc<dyn ModelEngine> = if cli.offline {
        Arc::new(ScriptedEngine::echo())
    } else {
        Arc::new(OpenAICompatEngine::from_config(&config.engine)?)
    };

    // Host side: shared registry, container, plugin activation
    let registry = SharedRegistry::new();
    registry.provide(ENGINE_PACKAGE, env!("CARGO_PKG_VERSION"), engine);
    let context = Arc::new(SharedContext::new(config));
    let container = FederationContainer::new(context.clone());
    container.init(registry);
    let module = container.get(INDEX_MODULE)?.invoke().await?;

    let kernel_specs = Arc::new(KernelSpecRegistry::new());
    let settings = Arc::new(InMemorySettingRegistry::new());
    if let Some(model) = &cli.model {
        settings
            .plugin(PLUGIN_ID)
            .await
            .set(DEFAULT_MODEL_KEY, serde_json::json!(model));
    }
    let capabilities = HostCapabilities::new()
        .with_kernel_specs(kernel_specs.clone())
        .with_setting_registry(settings);
    let app = HostApp::new("llmkernel-terminal", env!("CARGO_PKG_VERSION"));
    for plugin in module.default.iter().filter(|plugin| plugin.auto_start) {
        plugin.activate(&app, &capabilities).await?;
    }

    let kernel_name = context.config().kernel.name.clone();
    let spec = kernel_specs
        .spec(&kernel_name)
        .ok_or_else(|| Error::internal(format!("kernel {} was not registered", kernel_name)))?;
    info!("starting kernel {} ({})", spec.name, spec.display_name);
    let (kernel_context, mut outputs) = ChannelContext::new();
    let kernel_context = Arc::new(kernel_context);
    let kernel = kernel_specs
        .start(&kernel_name, kernel_context.clone())
        .ok_or_else(|| Error::internal(format!("kernel {} was not registered", kernel_name)))?;

    let (events, _) = context.event_bus().subscribe();
    let progress = tokio::spawn(async move {
        let mut events = events.into_stream();
        while let Some(event) = events.next().await {
            if let Event::Progress(p) = event {
                eprintln!("[{:>3.0}%] {}", p.progress * 100.0, p.text);
            }
        }
    });

    println!("{}", kernel.kernel_info_request().await.banner);
    println!("Send a line to the model, `:<msg_type> <json>` for raw requests, `exit` to quit.");

    let session = Uuid::new_v4().to_string();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nIn [{}]: ", kernel_context.execution_count() + 1);
        let _ = std::io::stdout().flush();
        let line = match lines
            .next_line()
            .await
            .map_err(|e| Error::internal(format!("Failed to read stdin: {}", e)))?
        {
            Some(line) => line,
            None => break,
        };
        let code = line.trim();
        if code.is_empty() {
            continue;
        }
        if code == "exit" || code == "quit" {
            break;
        }

        if let Some(raw) = code.strip_prefix(':') {
            let (msg_type, content) = raw.split_once(' ').unwrap_or((raw, "{}"));
            let content: serde_json::Value = match serde_json::from_str(content) {
                Ok(content) => content,
                Err(e) => {
                    eprintln!("Invalid JSON content: {}", e);
                    continue;
                }
            };
            kernel_context.begin_request(MessageHeader::new(msg_type, &session));
            match dispatch(kernel.as_ref(), msg_type, content).await {
                Ok(Some(reply)) => println!(
                    "{}",
                    serde_json::to_string_pretty(&reply).unwrap_or_default()
                ),
                Ok(None) => {}
                Err(e) => eprintln!("{}", e),
            }
            while let Ok(output) = outputs.try_recv() {
                print_output(output);
            }
            continue;
        }

        kernel_context.begin_request(MessageHeader::new("execute_request", &session));
        let execute = kernel.execute_request(ExecuteRequest::new(code));
        tokio::pin!(execute);
        let reply = loop {
            tokio::select! {
                reply = &mut execute => break reply,
                Some(output) = outputs.recv() => print_output(output),
            }
        };
        while let Ok(output) = outputs.try_recv() {
            print_output(output);
        }
        debug!("execute reply: {:?}", reply);
    }

    kernel_context.begin_request(MessageHeader::new("shutdown_request", &session));
    kernel.shutdown_request(ShutdownRequest::default()).await;
    progress.abort();
    println!("\nKernel shut down.");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
