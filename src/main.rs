//! Stubo CLI

use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, bail, Context};
use stubo::api::ApiResponse;
use stubo::config::{Config, Mode, SessionConfig};
use stubo::{Session, StuboClient};
use tracing::info;

const USAGE: &str = "\
Usage: stubo [--config FILE] [--log-level LEVEL] <command> [args]

Commands:
  status [scenario]                 Show server, scenario or session status
  stublist <scenario>               List the stubs of a scenario
  delete-stubs <scenario> [--force] Delete the stubs of a scenario
  export <scenario>                 Export a scenario
  demo <record|play|auto> <url> [body]
                                    Send one request through a session

Environment:
  STUBO_DC                          Stub server host[:port]
  STUBO_USER, STUBO_PASSWORD        Basic-auth credentials";

struct Args {
    config: Option<PathBuf>,
    log_level: Option<String>,
    command: Vec<String>,
}

fn parse_args(raw: Vec<String>) -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        log_level: None,
        command: Vec::new(),
    };

    let mut iter = raw.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter.next().ok_or_else(|| anyhow!("--config needs a file"))?;
                args.config = Some(PathBuf::from(path));
            }
            "--log-level" | "-l" => {
                let level = iter
                    .next()
                    .ok_or_else(|| anyhow!("--log-level needs a level"))?;
                args.log_level = Some(level);
            }
            _ => {
                args.command.push(arg);
                args.command.extend(iter.by_ref());
            }
        }
    }

    Ok(args)
}

#[tokio::main]
async fn main() {
    let args = match parse_args(std::env::args().skip(1).collect()) {
        Ok(args) if !args.command.is_empty() => args,
        Ok(_) => {
            eprintln!("Stubo v{}", env!("CARGO_PKG_VERSION"));
            eprintln!();
            eprintln!("{USAGE}");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Run 'stubo' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = stubo::logging::init(args.log_level.as_deref()) {
        eprintln!("{e}");
        process::exit(1);
    }

    if let Err(e) = run(args).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    config.client = config.client.with_env_overrides();
    config.validate()?;

    let stubo = StuboClient::new(config.client.clone())?;
    let command: Vec<&str> = args.command.iter().map(String::as_str).collect();

    match command.as_slice() {
        ["status"] => print_json(&stubo.get_status(None, None).await?),
        ["status", scenario] => print_json(&stubo.get_status(Some(*scenario), None).await?),
        ["stublist", scenario] => print_json(&stubo.get_stublist(scenario).await?),
        ["delete-stubs", scenario] => print_json(&stubo.delete_stubs(scenario, false).await?),
        ["delete-stubs", scenario, "--force"] => {
            print_json(&stubo.delete_stubs(scenario, true).await?)
        }
        ["export", scenario] => print_json(&stubo.get_export(scenario).await?),
        ["demo", mode, url, rest @ ..] => {
            let session_config = config
                .session
                .clone()
                .unwrap_or_else(|| SessionConfig::new("rust_example", "rust_example_1"));
            let body = rest.first().copied().unwrap_or("hello world").to_string();
            demo(Session::with_client(stubo, session_config), mode, url, body).await
        }
        _ => bail!("Unknown command: {}\n\n{USAGE}", args.command.join(" ")),
    }
}

async fn demo(mut session: Session, mode: &str, url: &str, body: String) -> anyhow::Result<()> {
    let url = url.to_string();
    let send = |client: stubo::network::InterceptedClient| async move {
        let response = client.post(&url, body).await?;
        println!("{} {}", response.status, response.text());
        Ok::<_, anyhow::Error>(())
    };

    match mode {
        "record" => session.record(send).await?,
        "play" | "playback" => session.play(send).await?,
        "auto" => session.record_or_play(None, send).await?,
        other => {
            let mode: Mode = other.parse()?;
            session.record_or_play(Some(mode), send).await?;
        }
    }

    info!(
        "Demo finished, {} exchange(s) recorded",
        session.calls()?.len()
    );
    Ok(())
}

fn print_json(response: &ApiResponse) -> anyhow::Result<()> {
    match response.json::<serde_json::Value>() {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{} {}", response.status(), response.text()),
    }
    Ok(())
}
