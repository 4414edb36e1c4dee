use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, Command};
use tracing::debug;
use weaver_core::{init_tracing, init_tracing_with, IoMode, Value, Weaver, WeaverConfig};

fn cli() -> Command {
    Command::new("weaver")
        .version(weaver_core::VERSION)
        .about("Generate AOP proxies for Weave classes")
        .arg(
            Arg::new("root")
                .long("root")
                .value_name("DIR")
                .help("Source root; may be repeated")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file"),
        )
        .arg(
            Arg::new("async-io")
                .long("async-io")
                .help("Read sources through tokio")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Enable debug mode")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("class")
                .value_name("CLASS")
                .help("Fully-qualified class to proxy")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("print")
                .long("print")
                .help("Print the generated proxy source")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("call")
                .long("call")
                .value_name("METHOD")
                .help("Instantiate the proxy and invoke METHOD"),
        )
        .arg(
            Arg::new("args")
                .long("args")
                .value_name("JSON")
                .requires("call")
                .help("JSON array of arguments for --call"),
        )
        .arg(
            Arg::new("init-args")
                .long("init-args")
                .value_name("JSON")
                .requires("call")
                .help("JSON array of constructor arguments"),
        )
}

/// Parse a JSON array argument into runtime values
fn json_args(flag: &str, raw: Option<&String>) -> Result<Vec<Value>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let json: serde_json::Value =
        serde_json::from_str(raw).with_context(|| format!("--{flag} is not valid JSON"))?;
    match json {
        serde_json::Value::Array(items) => Ok(items.iter().map(Value::from_json).collect()),
        _ => bail!("--{flag} must be a JSON array"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => WeaverConfig::from_json_file(path)?,
        None => WeaverConfig::default(),
    };
    if let Some(roots) = matches.get_many::<String>("root") {
        config.source_roots = roots.map(PathBuf::from).collect();
    }
    if matches.get_flag("async-io") {
        config.io_mode = IoMode::Async;
    }
    config.debug |= matches.get_flag("debug");

    if config.debug {
        init_tracing_with("weaver_core=debug");
    } else {
        init_tracing();
    }
    debug!("Configuration: {:?}", config);

    let class = matches
        .get_one::<String>("class")
        .context("CLASS is required")?;
    let init_args = json_args("init-args", matches.get_one::<String>("init-args"))?;
    let call_args = json_args("args", matches.get_one::<String>("args"))?;

    let weaver = Weaver::new(config)?;
    // in async mode the class source is read through tokio before generation
    let name = class.parse()?;
    weaver.parser().get_or_parse_async(&name).await?;
    let output = weaver.generate(class)?;
    let proxy = output.identity.proxy_name;
    println!("{proxy}");

    if matches.get_flag("print") {
        print!("{}", output.source);
    }

    if let Some(method) = matches.get_one::<String>("call") {
        let instance = weaver.instantiate(&proxy, init_args)?;
        let result = weaver.call(&instance, method, call_args)?;
        for line in weaver.runtime().take_output() {
            println!("{line}");
        }
        println!("{}", serde_json::to_string_pretty(&result.to_json())?);
    }

    Ok(())
}
