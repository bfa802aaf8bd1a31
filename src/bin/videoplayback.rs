use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use retico_videoplayback::{
    IpCameraConfig, IpCameraProducer, PlaybackConfig, PlaybackState, ProducerConfig,
    ProducingModule, UpdateMessage, VideoPlaybackProducer,
};

const IDLE_SLEEP: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Source {
    Camera,
    File,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run an IP camera or video playback producer as a minimal pipeline host"
)]
struct Args {
    /// Path to a JSON config file.
    #[arg(long, env = "VIDEOPLAYBACK_CONFIG")]
    config: Option<PathBuf>,

    /// Producer to run.
    #[arg(long, value_enum, default_value = "file")]
    source: Source,

    /// Camera stream URL (overrides the config file).
    #[arg(long)]
    url: Option<String>,

    /// Video file path (overrides the config file).
    #[arg(long)]
    path: Option<String>,

    /// Target playback rate; 0 plays as fast as frames decode.
    #[arg(long)]
    fps: Option<f64>,

    /// Stop at the end of the file instead of looping.
    #[arg(long)]
    no_loop: bool,

    /// Number of host cycles to run (0 runs until Ctrl-C).
    #[arg(long, default_value = "0")]
    cycles: u64,

    /// Write the last emitted frame to this image file on exit.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Seconds between stats log lines (0 disables).
    #[arg(long, default_value = "10")]
    stats_interval_secs: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = ProducerConfig::read_from(args.config.as_deref())?;

    match args.source {
        Source::Camera => {
            let producer = IpCameraProducer::new(camera_config(&args, cfg.ip_camera)?)?;
            drive(
                producer,
                &args,
                |p: &IpCameraProducer| format!("{:?}", p.stats()),
                |_: &IpCameraProducer| false,
            )
        }
        Source::File => {
            let producer = VideoPlaybackProducer::new(playback_config(&args, cfg.playback)?)?;
            drive(
                producer,
                &args,
                |p: &VideoPlaybackProducer| format!("{:?}", p.stats()),
                |p: &VideoPlaybackProducer| p.state() == PlaybackState::EndOfStream,
            )
        }
    }
}

fn camera_config(args: &Args, section: Option<IpCameraConfig>) -> Result<IpCameraConfig> {
    match (section, args.url.as_ref()) {
        (Some(config), None) => Ok(config),
        (section, Some(url)) => {
            let mut config = section.unwrap_or_else(|| IpCameraConfig::new(url.clone()));
            config.url = url.clone();
            Ok(config)
        }
        (None, None) => bail!("no camera url: pass --url or set VIDEOPLAYBACK_CAMERA_URL"),
    }
}

fn playback_config(args: &Args, section: Option<PlaybackConfig>) -> Result<PlaybackConfig> {
    let mut config = match (section, args.path.as_ref()) {
        (Some(config), None) => config,
        (section, Some(path)) => {
            let mut config = section.unwrap_or_else(|| PlaybackConfig::new(path.clone()));
            config.path = path.clone();
            config
        }
        (None, None) => bail!("no video path: pass --path or set VIDEOPLAYBACK_VIDEO_PATH"),
    };
    if let Some(fps) = args.fps {
        config.fps = Some(fps);
    }
    if args.no_loop {
        config.loop_playback = false;
    }
    Ok(config)
}

fn drive<P: ProducingModule>(
    mut producer: P,
    args: &Args,
    describe: fn(&P) -> String,
    finished: fn(&P) -> bool,
) -> Result<()> {
    let stop = producer.stop_handle();
    let signal_stop = stop.clone();
    ctrlc::set_handler(move || signal_stop.stop()).context("set Ctrl-C handler")?;

    log::info!("{}: {}", producer.name(), producer.description());
    producer.setup()?;

    let stats_interval = Duration::from_secs(args.stats_interval_secs);
    let mut last_stats = Instant::now();
    let mut last_update: Option<UpdateMessage> = None;
    let mut cycles = 0u64;
    let mut emitted = 0u64;

    while !stop.is_stopped() && (args.cycles == 0 || cycles < args.cycles) {
        cycles += 1;
        match producer.process_update() {
            Some(update) => {
                emitted += update.len() as u64;
                if let Some(iu) = update.first_iu() {
                    log::debug!(
                        "iu {} frame {} ({}x{} at {:.2} fps)",
                        iu.iu_id,
                        iu.frame_index,
                        iu.image.width(),
                        iu.image.height(),
                        iu.rate
                    );
                }
                last_update = Some(update);
            }
            None => {
                if finished(&producer) {
                    log::info!("{}: source finished", producer.name());
                    break;
                }
                std::thread::sleep(IDLE_SLEEP);
            }
        }
        if !stats_interval.is_zero() && last_stats.elapsed() >= stats_interval {
            log::info!("{} stats: {}", producer.name(), describe(&producer));
            last_stats = Instant::now();
        }
    }

    producer.shutdown();
    log::info!(
        "{} stopped after {} cycles, {} IUs emitted: {}",
        producer.name(),
        cycles,
        emitted,
        describe(&producer)
    );

    if let Some(path) = &args.snapshot {
        match &last_update {
            Some(update) => save_snapshot(path, update)?,
            None => log::warn!("no frame was emitted; snapshot {} not written", path.display()),
        }
    }
    Ok(())
}

fn save_snapshot(path: &Path, update: &UpdateMessage) -> Result<()> {
    let iu = update
        .first_iu()
        .ok_or_else(|| anyhow!("update carries no IU"))?;
    let image = iu
        .image
        .to_rgb_image()
        .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
    image
        .save(path)
        .with_context(|| format!("write snapshot {}", path.display()))?;
    log::info!("snapshot of frame {} written to {}", iu.frame_index, path.display());
    Ok(())
}
