use anyhow::{anyhow, bail, Context};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use strtc::{
    ChannelId, ChannelRole, Engine, EngineConfig, EngineObserver, ImageSurface, StreamConfig,
    StreamKind,
};

const USAGE: &str = "Usage: strtc-cli <publish|play> <webrtc-url> [--config <file>] \
[--audio-only] [--screen] [--test-pattern] [--snapshot <png>] [--seconds <n>] [--json]";

struct Options {
    url: String,
    config: Option<PathBuf>,
    audio_only: bool,
    screen: bool,
    test_pattern: bool,
    snapshot: Option<PathBuf>,
    seconds: Option<u64>,
    json: bool,
}

/// Prints asynchronous stream failures.
struct PrintObserver {
    json: bool,
}

impl EngineObserver for PrintObserver {
    fn on_stream_error(&self, channel_id: ChannelId, code: i32, message: &str) {
        if self.json {
            println!(
                "{}",
                serde_json::json!({
                    "event": "stream_error",
                    "channel": channel_id.0,
                    "code": code,
                    "message": message,
                })
            );
        } else {
            eprintln!("Channel {} error {}: {}", channel_id, code, message);
        }
    }
}

fn main() -> anyhow::Result<()> {
    strtc::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let role = match args[1].as_str() {
        "publish" => ChannelRole::Publish,
        "play" => ChannelRole::Subscribe,
        "info" => {
            println!("{}", serde_json::to_string_pretty(&strtc::get_info())?);
            return Ok(());
        }
        other => {
            eprintln!("Unknown command: {}\n{}", other, USAGE);
            std::process::exit(1);
        }
    };

    let options = parse_options(&args[2..])?;
    run(role, options)
}

fn parse_options(args: &[String]) -> anyhow::Result<Options> {
    let mut url = None;
    let mut options = Options {
        url: String::new(),
        config: None,
        audio_only: false,
        screen: false,
        test_pattern: false,
        snapshot: None,
        seconds: None,
        json: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                options.config = Some(PathBuf::from(value(args, i, "--config")?));
            }
            "--snapshot" => {
                i += 1;
                options.snapshot = Some(PathBuf::from(value(args, i, "--snapshot")?));
            }
            "--seconds" => {
                i += 1;
                options.seconds = Some(
                    value(args, i, "--seconds")?
                        .parse()
                        .context("--seconds expects a number")?,
                );
            }
            "--audio-only" => options.audio_only = true,
            "--screen" => options.screen = true,
            "--test-pattern" => options.test_pattern = true,
            "--json" => options.json = true,
            other if other.starts_with("--") => bail!("Unknown option {}", other),
            other => {
                if url.is_some() {
                    bail!("Unexpected argument {}", other);
                }
                url = Some(other.to_string());
            }
        }
        i += 1;
    }

    options.url = url.ok_or_else(|| anyhow!("stream url required"))?;
    Ok(options)
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> anyhow::Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} expects a value", flag))
}

fn run(role: ChannelRole, options: Options) -> anyhow::Result<()> {
    let mut config = match &options.config {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::load_or_default(),
    };
    if options.test_pattern {
        config.capture.test_pattern = true;
    }

    let mut stream: StreamConfig = config.stream.clone();
    if options.audio_only {
        stream.has_video = false;
    }
    if options.screen {
        stream.kind = StreamKind::Screen;
    }

    let engine = Engine::builder(config)
        .observer(Arc::new(PrintObserver { json: options.json }))
        .build();
    engine.init().context("Failed to initialize engine")?;

    let surface = options
        .snapshot
        .as_ref()
        .map(|_| Arc::new(ImageSurface::new(stream.width, stream.height)));

    if role == ChannelRole::Publish {
        engine.start_stream(stream).context("Failed to start local stream")?;
        if let Some(surface) = &surface {
            engine.set_local_video_render(surface.clone());
        }
    }

    let id = engine.create_channel(role)?;
    if role == ChannelRole::Subscribe {
        if let Some(surface) = &surface {
            engine.set_remote_video_render(id, surface.clone());
        }
    }

    let (done_tx, done_rx) = crossbeam_channel::bounded::<Result<(), String>>(2);
    let failure_tx = done_tx.clone();
    engine.start(
        id,
        &options.url,
        move || {
            let _ = done_tx.send(Ok(()));
        },
        move |e| {
            let _ = failure_tx.send(Err(e.to_string()));
        },
    );

    match done_rx.recv() {
        Ok(Ok(())) => report(&options, id, role, "connected", None),
        Ok(Err(reason)) => {
            report(&options, id, role, "failed", Some(&reason));
            engine.shutdown();
            std::process::exit(2);
        }
        Err(_) => bail!("Engine stopped before the channel resolved"),
    }

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("Failed to install Ctrl-C handler")?;

    match options.seconds {
        Some(seconds) => {
            let _ = stop_rx.recv_timeout(Duration::from_secs(seconds));
        }
        None => {
            let _ = stop_rx.recv();
        }
    }

    engine.stop(id);
    if let (Some(surface), Some(path)) = (&surface, &options.snapshot) {
        surface.save(path)?;
        if !options.json {
            println!(
                "Saved snapshot to {} ({} frames presented)",
                path.display(),
                surface.frames_presented()
            );
        }
    }
    engine.shutdown();
    Ok(())
}

fn report(options: &Options, id: ChannelId, role: ChannelRole, status: &str, reason: Option<&str>) {
    if options.json {
        println!(
            "{}",
            serde_json::json!({
                "channel": id.0,
                "role": role.as_str(),
                "url": options.url,
                "status": status,
                "reason": reason,
            })
        );
    } else {
        match reason {
            Some(reason) => println!("{} {} {}: {}", role, options.url, status, reason),
            None => println!("{} {} {}", role, options.url, status),
        }
    }
}
