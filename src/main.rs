use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use argh::FromArgs;
use tokio_util::sync::CancellationToken;

use mediagen::{Blob, Config, GenerationClient, GenerationRequest, Mode};

#[derive(Debug, FromArgs, PartialEq)]
/// Submit a generation request and write the artifact to stdout
struct Args {
    /// submit as a deferred job and poll for the result
    #[argh(switch, long = "async")]
    deferred: bool,

    /// input image to attach
    #[argh(option)]
    image: Option<PathBuf>,

    /// mask image to attach
    #[argh(option)]
    mask: Option<PathBuf>,

    /// endpoint path, e.g. /stable-image/generate/core
    #[argh(positional)]
    endpoint: String,

    /// generation prompt
    #[argh(positional)]
    prompt: String,

    /// extra parameters as key=value, sent verbatim
    #[argh(positional, from_str_fn(parse_param))]
    params: Vec<(String, String)>,
}

impl Args {
    fn mode(&self) -> Mode {
        if self.deferred { Mode::Async } else { Mode::Sync }
    }
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}

async fn read_blob(path: &Path) -> anyhow::Result<Blob> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let mut blob = Blob::new(bytes);
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        blob = blob.with_file_name(name);
    }
    Ok(blob)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    dotenvy::dotenv().ok();

    let args: Args = argh::from_env();
    let mode = args.mode();
    let config = Config::load()?;
    let client = GenerationClient::from_config(&config)?;

    let mut builder = GenerationRequest::builder(args.prompt);
    if let Some(path) = &args.image {
        builder = builder.image(read_blob(path).await?);
    }
    if let Some(path) = &args.mask {
        builder = builder.mask(read_blob(path).await?);
    }
    for (k, v) in args.params {
        builder = builder.param(k, v);
    }
    let request = builder.build()?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let artifact = client
        .generate(&args.endpoint, &request, mode, Some(&cancel))
        .await
        .inspect_err(|e| tracing::error!("{}", e.user_message()))?;

    tracing::info!(
        bytes = artifact.bytes.len(),
        content_type = artifact.content_type,
        "artifact received"
    );

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&artifact.bytes)?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(list: &[&str]) -> Result<Args, argh::EarlyExit> {
        Args::from_args(&["mediagen"], list)
    }

    #[test]
    fn parses_async_with_params() {
        let parsed = parse_args(&[
            "--async",
            "--image",
            "in.png",
            "/stable-image/upscale/creative",
            "a red balloon",
            "seed=42",
            "creativity=0.3",
            "output_format=webp",
        ])
        .unwrap();
        assert_eq!(parsed.mode(), Mode::Async);
        assert_eq!(parsed.image, Some(PathBuf::from("in.png")));
        assert_eq!(parsed.mask, None);
        assert_eq!(parsed.endpoint, "/stable-image/upscale/creative");
        assert_eq!(parsed.prompt, "a red balloon");
        assert_eq!(
            parsed.params,
            vec![
                ("seed".to_string(), "42".to_string()),
                ("creativity".to_string(), "0.3".to_string()),
                ("output_format".to_string(), "webp".to_string()),
            ]
        );
    }

    #[test]
    fn param_values_kept_verbatim() {
        let parsed = parse_args(&["/e", "p", "a=Infinity", "b=nan", "c=007", "d=1e3", "e=x=y"])
            .unwrap();
        let values: Vec<&str> = parsed.params.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, ["Infinity", "nan", "007", "1e3", "x=y"]);
    }

    #[test]
    fn defaults_to_sync() {
        let parsed = parse_args(&["/stable-image/generate/core", "a cat"]).unwrap();
        assert_eq!(parsed.mode(), Mode::Sync);
        assert!(parsed.params.is_empty());
    }

    #[test]
    fn missing_prompt_is_usage_error() {
        assert!(parse_args(&["/stable-image/generate/core"]).is_err());
    }

    #[test]
    fn bare_param_rejected() {
        assert!(parse_args(&["/e", "p", "seed"]).is_err());
        assert!(parse_args(&["/e", "p", "=5"]).is_err());
    }

    #[test]
    fn unknown_flag_rejected() {
        assert!(parse_args(&["--verbose", "/e", "p"]).is_err());
    }
}
