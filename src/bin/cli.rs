use clap::{App, Arg, SubCommand};
use fringesync::{
    acquisition::{
        self, AcquisitionConfig, AcquisitionShared, AcquisitionThread,
    },
    camera::{FileReplayCamera, SimulatedCamera, SimulatedCameraConfig},
    display::{DisplayConfig, DisplayLink},
    events::{wait_any, DrawCode, EventRegistry, MainCode, WaitOutcome},
    frames::{FrameMetadata, FrameQueue, PatternKind},
    stats::StatsSnapshot,
    CameraCode, Result,
};
use std::{sync::Arc, thread, time::Duration};

fn main() -> Result<()> {
    env_logger::init();

    let matches = App::new("fringesync-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Structured-light acquisition synchronization tool")
        .subcommand(
            SubCommand::with_name("simulate")
                .about("Run a batch against simulated cameras")
                .arg(
                    Arg::with_name("cameras")
                        .short("c")
                        .long("cameras")
                        .value_name("COUNT")
                        .help("Number of simulated cameras")
                        .default_value("2")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("frames")
                        .short("f")
                        .long("frames")
                        .value_name("COUNT")
                        .help("Number of frames in the batch")
                        .default_value("20")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("exposure")
                        .short("e")
                        .long("exposure")
                        .value_name("MICROSECONDS")
                        .help("Requested exposure time")
                        .default_value("8000")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("refresh")
                        .short("r")
                        .long("refresh")
                        .value_name("HZ")
                        .help("Projector refresh rate")
                        .default_value("60")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("blocking")
                        .long("blocking")
                        .help("Presentation waits for every camera's exposure"),
                )
                .arg(
                    Arg::with_name("concurrent")
                        .long("concurrent")
                        .help("Overlap exposure with the next present (blocking mode)"),
                )
                .arg(
                    Arg::with_name("fixed")
                        .long("fixed")
                        .help("Re-trigger a single fixed pattern instead of a queue"),
                ),
        )
        .subcommand(
            SubCommand::with_name("replay")
                .about("Validate a directory of replay frame files")
                .arg(
                    Arg::with_name("directory")
                        .short("d")
                        .long("directory")
                        .value_name("DIR")
                        .help("Directory holding frame_%05d.png files")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("suffix")
                        .short("s")
                        .long("suffix")
                        .value_name("SUFFIX")
                        .help("Optional file-name suffix (frame_%05d_SUFFIX.png)")
                        .takes_value(true),
                ),
        )
        .subcommand(SubCommand::with_name("info").about("Show version information"))
        .get_matches();

    match matches.subcommand() {
        ("simulate", Some(sim_matches)) => run_simulation(sim_matches),
        ("replay", Some(replay_matches)) => validate_replay(replay_matches),
        ("info", Some(_)) => show_info(),
        _ => {
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

fn run_simulation(matches: &clap::ArgMatches) -> Result<()> {
    let camera_count: usize = parse_arg(matches, "cameras")?;
    let frame_count: u64 = parse_arg(matches, "frames")?;
    let exposure_us: f64 = parse_arg(matches, "exposure")?;
    let refresh_hz: u32 = parse_arg(matches, "refresh")?;
    let blocking = matches.is_present("blocking");
    let concurrent = matches.is_present("concurrent");
    let fixed = matches.is_present("fixed");

    println!("Simulating a batch:");
    println!("  Cameras: {}", camera_count);
    println!("  Frames: {}", frame_count);
    println!("  Exposure: {}us", exposure_us);
    println!(
        "  Mode: {}{}{}",
        if blocking { "blocking" } else { "non-blocking" },
        if concurrent { ", concurrent delay" } else { "" },
        if fixed { ", fixed pattern" } else { "" },
    );

    let registry = EventRegistry::new_shared()?;
    let projector = registry.add_projector()?;
    acquisition::configure_projector_barriers(&registry, projector, camera_count)?;

    let display = Arc::new(DisplayLink::new(DisplayConfig {
        refresh_num: refresh_hz,
        refresh_den: 1,
        blocking,
        fixed_pattern: fixed,
        concurrent_delay: concurrent,
        ..DisplayConfig::default()
    })?);
    let refresh = display.refresh_interval();

    let queue = Arc::new(FrameQueue::new());
    if !fixed {
        let origin = std::time::Instant::now() + Duration::from_millis(50);
        for key in 0..frame_count {
            let mut record =
                FrameMetadata::new(key, PatternKind::Normal, 500.0, exposure_us)
                    .with_last_frame(key + 1 == frame_count);
            if !blocking {
                record = record.with_scheduled_present(origin + refresh * (key as u32 + 1));
            }
            queue.push_back(record);
        }
    }

    let mut threads = Vec::with_capacity(camera_count);
    let mut camera_ids = Vec::with_capacity(camera_count);
    for _ in 0..camera_count {
        let camera_id = registry.add_camera()?;
        camera_ids.push(camera_id);
        let camera = SimulatedCamera::new(SimulatedCameraConfig::default());
        let shared = AcquisitionShared::new(
            AcquisitionConfig {
                camera_id,
                projector_id: projector,
                requested_exposure_us: exposure_us,
                ..AcquisitionConfig::default()
            },
            Arc::clone(&registry),
            Arc::clone(&display),
            Arc::clone(&queue),
            Box::new(camera),
        );
        threads.push(AcquisitionThread::start(shared)?);
    }

    // Blocking modes need a presentation side answering the handshakes
    let presenter = if blocking && !fixed {
        let presenter_registry = Arc::clone(&registry);
        Some(thread::spawn(move || {
            run_presenter(presenter_registry, projector, refresh)
        }))
    } else {
        None
    };

    acquisition::prepare_cameras(&registry, &camera_ids, Some(Duration::from_secs(5)))?;

    // Drive the batch: one trigger per frame per camera, paced by Ready
    for _ in 0..frame_count {
        for &camera_id in &camera_ids {
            let ready = registry.event(CameraCode::Ready, camera_id)?;
            match wait_any(&[ready.fd()], Some(Duration::from_secs(5)))? {
                WaitOutcome::Signaled(_) => {
                    ready.reset();
                    registry.set(CameraCode::SendTrigger, camera_id)?;
                }
                _ => {
                    eprintln!("camera {} never became ready", camera_id);
                    break;
                }
            }
        }
    }

    if !fixed {
        let outcome = acquisition::await_last_frames(
            &registry,
            &camera_ids,
            Some(Duration::from_secs(10)),
        )?;
        if outcome != WaitOutcome::AllSignaled {
            eprintln!("batch did not complete: {:?}", outcome);
        }
    }

    registry.set(MainCode::Terminate, 0)?;
    if let Some(handle) = presenter {
        let _ = handle.join();
    }

    for thread in threads {
        let shared = thread.shared();
        let camera_id = shared.camera_id();
        thread.stop()?;
        println!("\nCamera {}:", camera_id);
        println!("  Triggers fired: {}", shared.trigger_count());
        print_stats("Trigger duration", &shared.trigger_duration_stats().snapshot());
        print_stats("Trigger frequency", &shared.trigger_frequency_stats().snapshot());
        print_stats("Acquisition", &shared.acquisition_stats().snapshot());
    }

    Ok(())
}

/// Minimal presentation loop: consume Present/Render requests, simulate the
/// flip, and re-stage the ready signals the cameras wait on
fn run_presenter(registry: Arc<EventRegistry>, projector: usize, refresh: Duration) -> Result<()> {
    let terminate = registry.event(MainCode::Terminate, 0)?;
    let present = registry.event(DrawCode::Present, projector)?;
    let render = registry.event(DrawCode::Render, projector)?;
    registry.set(DrawCode::PresentReady, projector)?;
    registry.set(DrawCode::RenderReady, projector)?;
    loop {
        match wait_any(&[terminate.fd(), present.fd(), render.fd()], None)? {
            WaitOutcome::Signaled(0) => return Ok(()),
            WaitOutcome::Signaled(1) => {
                present.reset();
                thread::sleep(refresh);
                registry.set(DrawCode::PresentReady, projector)?;
            }
            WaitOutcome::Signaled(2) => {
                render.reset();
                registry.set(DrawCode::RenderReady, projector)?;
            }
            _ => {}
        }
    }
}

fn validate_replay(matches: &clap::ArgMatches) -> Result<()> {
    let directory = matches.value_of("directory").unwrap();
    let suffix = matches.value_of("suffix");

    let camera = FileReplayCamera::new(directory, suffix)?;
    let count = camera.frame_count();
    println!("Replay source: {}", camera.directory().display());
    if count == 0 {
        println!("No consecutive frame files found");
    } else {
        println!("Consecutive frames available: {}", count);
    }
    Ok(())
}

fn show_info() -> Result<()> {
    println!("fringesync");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("\nCapabilities:");
    println!("  - Named manual-reset signal registry over eventfd");
    println!("  - Counted set/reset barriers for multi-camera projectors");
    println!("  - Hybrid sleep-then-spin trigger timing");
    println!("  - Per-camera acquisition threads with exposure watchdog");
    println!("  - File-replay camera sources");
    Ok(())
}

fn print_stats(label: &str, snapshot: &StatsSnapshot) {
    if snapshot.count == 0 {
        println!("  {}: no samples", label);
        return;
    }
    println!(
        "  {}: n={} mean={:.3}ms sd={:.3}ms min={:.3}ms max={:.3}ms fps={:.1}",
        label,
        snapshot.count,
        snapshot.mean_ms,
        snapshot.deviation_ms,
        snapshot.min_ms,
        snapshot.max_ms,
        snapshot.fps,
    );
}

fn parse_arg<T: std::str::FromStr>(matches: &clap::ArgMatches, name: &str) -> Result<T> {
    matches
        .value_of(name)
        .unwrap()
        .parse()
        .map_err(|_| fringesync::FringeError::invalid_parameter(name, "invalid value"))
}
