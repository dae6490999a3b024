use anyhow::Context;
use clap::Parser;
use dcv_common::{InstanceHandle, ProvisionError};
use dcv_orchestrator::logger;
use dcv_orchestrator::provider_manager::ProviderManager;
use dcv_orchestrator::selection::{self, Menu};
use dcv_orchestrator::settings::Settings;
use dcv_orchestrator::state_machine::ProvisionEvent;
use dcv_orchestrator::{validate_launch_identity, Provisioner};
use tokio_util::sync::CancellationToken;

/// Launch one cloud instance running a DCV remote-desktop server and print
/// where to connect.
#[derive(Parser, Debug)]
#[command(name = "dcv-launcher", version, about)]
struct Args {
    /// Operating system: 1 = Linux, 2 = Windows. Prompted when absent.
    #[arg(long, env = "DCV_OS")]
    os: Option<String>,

    /// Instance size: 1 = small, 2 = large. Prompted when absent.
    #[arg(long, env = "DCV_SIZE")]
    size: Option<String>,

    /// Compute provider (overrides PROVIDER).
    #[arg(long)]
    provider: Option<String>,

    /// Print the final instance handle and URL as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();
    if let Err(e) = logger::init() {
        eprintln!("⚠️  {:#}", e);
    }

    if let Err(err) = run(args).await {
        eprintln!("❌ {:#}", err);
        let code = match err.downcast_ref::<ProvisionError>() {
            Some(provision_err) => {
                if let Some(warning) = provision_err.leftover_warning() {
                    eprintln!("⚠️  {}", warning);
                }
                provision_err.exit_code()
            }
            None => 1,
        };
        std::process::exit(code);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    // Fail before asking anything if the launch could never be submitted.
    validate_launch_identity(settings.key_pair_name(), settings.security_group_id())?;

    let (os, size) = selection::select(args.os.as_deref(), args.size.as_deref(), prompt_choice)?;

    let provider_name = args
        .provider
        .clone()
        .unwrap_or_else(|| ProviderManager::current_provider_name(&settings).to_string());
    let provider = ProviderManager::get_provider(&provider_name, &settings)?;
    let catalog = settings.catalog()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping");
            on_interrupt.cancel();
        }
    });

    let json = args.json;
    if !json {
        println!(
            "🚀 Launching {} / {} on {}...",
            os,
            size,
            provider.name()
        );
    }
    let provisioner = Provisioner::new(provider.as_ref(), catalog)
        .with_policy(settings.poll_policy.clone())
        .with_cancellation(cancel)
        .on_event(move |event| {
            if !json {
                print_event(event);
            }
        });

    let handle = provisioner
        .provision(
            os,
            size,
            settings.key_pair_name(),
            settings.security_group_id(),
        )
        .await?;

    print_result(&handle, json)
}

fn prompt_choice(menu: Menu) -> anyhow::Result<String> {
    for (i, option) in menu.options().iter().enumerate() {
        println!("  [{}] {}", i + 1, option);
    }
    dialoguer::Input::<String>::new()
        .with_prompt(menu.title())
        .interact_text()
        .with_context(|| format!("reading {}", menu.title().to_lowercase()))
}

fn print_event(event: &ProvisionEvent) {
    match event {
        ProvisionEvent::Launched { instance_id } => {
            println!("🆔 Instance id: {}", instance_id)
        }
        ProvisionEvent::Polled { attempt, state } => {
            println!("⏳ [{}] state: {}", attempt, state)
        }
        ProvisionEvent::RetryingAfterError {
            message, delay, ..
        } => println!(
            "⚠️  Status check failed ({}), retrying in {}s",
            message,
            delay.as_secs()
        ),
        ProvisionEvent::Ready { address } => println!("🌐 Public address: {}", address),
    }
}

fn print_result(handle: &InstanceHandle, json: bool) -> anyhow::Result<()> {
    let url = handle
        .connection_url()
        .context("instance reported ready without a public address")?;
    if json {
        let out = serde_json::json!({ "instance": handle, "url": url });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("✅ DCV server is coming up at {}", url);
        println!("   Connect with the DCV client or a browser once the boot script finishes.");
    }
    Ok(())
}
