use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;

use etcd_keys_client::{
    cli::{Cli, Command},
    Client, KeyResponse, Options,
};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let client = Client::with_config(cli.client_config()).context("failed to create client")?;
    debug!(machines = ?client.cluster().machines(), "client ready");

    let response = run(&client, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}

async fn run(client: &Client, command: Command) -> Result<KeyResponse> {
    let response = match command {
        Command::Get {
            key,
            sort,
            consistent,
        } => {
            let mut options = Options::new();
            if sort {
                options.insert("sorted", true);
            }
            if consistent {
                options.insert("consistent", true);
            }
            client
                .get_with(&key, &options)
                .await
                .with_context(|| format!("get {key}"))?
        }
        Command::Ls { key, recursive } => client
            .get(&key, true, recursive)
            .await
            .with_context(|| format!("ls {key}"))?,
        Command::Set(args) => {
            let write = &args.write;
            let result = if args.swap_with_value.is_some() || args.swap_with_index.is_some() {
                client
                    .compare_and_swap(
                        &write.key,
                        &write.value,
                        write.ttl(),
                        args.swap_with_value.as_deref(),
                        args.swap_with_index,
                    )
                    .await
            } else {
                client.set(&write.key, &write.value, write.ttl()).await
            };
            result.with_context(|| format!("set {}", write.key))?
        }
        Command::Mk(args) => client
            .create(&args.key, &args.value, args.ttl())
            .await
            .with_context(|| format!("mk {}", args.key))?,
        Command::Update(args) => client
            .update(&args.key, &args.value, args.ttl())
            .await
            .with_context(|| format!("update {}", args.key))?,
        Command::Post(args) => client
            .create_in_order(&args.key, &args.value, args.ttl())
            .await
            .with_context(|| format!("post {}", args.key))?,
        Command::Rm { key, recursive } => client
            .delete(&key, recursive)
            .await
            .with_context(|| format!("rm {key}"))?,
        Command::Watch {
            key,
            after_index,
            recursive,
        } => client
            .watch(&key, after_index, recursive)
            .await
            .with_context(|| format!("watch {key}"))?,
    };

    Ok(response)
}
