//! demo - end-to-end synthetic run: producer -> staging -> ETL (twice)

use anyhow::{anyhow, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use detection_etl::producer::{FrameView, Producer, RawDetection, SourceFrame, StubBackend};
use detection_etl::{
    Batcher, FileCheckpointStore, FileLoader, Pipeline, PublishTarget, RunStamp,
};

const FRAME_WIDTH: u32 = 320;
const FRAME_HEIGHT: u32 = 240;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Output root; staging, processed, warehouse and checkpoint live under it.
    #[arg(long, default_value = "demo_out")]
    out: PathBuf,
    /// Number of synthetic video frames.
    #[arg(long, default_value_t = 300)]
    frames: u32,
    /// Frame rate of the synthetic video.
    #[arg(long, default_value_t = 10.0)]
    fps: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.frames == 0 {
        return Err(anyhow!("frames must be >= 1"));
    }

    let staging_dir = args.out.join("staging");
    let processed_dir = args.out.join("processed");
    let warehouse_dir = args.out.join("warehouse");
    let checkpoint_path = staging_dir.join("etl_checkpoints").join("processed_files.txt");
    fs::create_dir_all(&args.out)?;

    // Producer: one still image plus a synthetic clip.
    let mut producer = Producer::new(StubBackend::scripted(script()))?;
    let pixels = synthetic_pixels(0);
    producer.process_frame(
        &SourceFrame::image("street.jpg"),
        &FrameView::new(&pixels, FRAME_WIDTH, FRAME_HEIGHT)?,
    )?;
    for frame_number in 0..args.frames {
        let pixels = synthetic_pixels(frame_number);
        producer.process_frame(
            &SourceFrame::video("cam1.mp4", frame_number as i64, args.fps),
            &FrameView::new(&pixels, FRAME_WIDTH, FRAME_HEIGHT)?,
        )?;
    }
    let stamp = RunStamp::now();
    let Some(staging_file) = producer.flush(&staging_dir, &stamp)? else {
        return Err(anyhow!("stub detector produced no detections"));
    };
    println!("staging file: {}", staging_file.display());

    let mut pipeline = Pipeline::new(
        &staging_dir,
        Batcher::default(),
        FileLoader::new(&processed_dir, PublishTarget::Directory(warehouse_dir.clone())),
        FileCheckpointStore::new(&checkpoint_path),
    );

    let first = pipeline.run(&stamp)?;
    println!("first run:  {}", first);
    let second = pipeline.run(&RunStamp::now())?;
    println!("second run: {}", second);
    if second.batches_published() != 0 {
        return Err(anyhow!("second run republished batches"));
    }

    let mut published: Vec<_> = fs::read_dir(&warehouse_dir)?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    published.sort();
    println!("warehouse {}:", warehouse_dir.display());
    for name in published {
        println!("  {}", name);
    }
    Ok(())
}

/// Replayed in a cycle across all frames: two people, a car, then a car and
/// a low-confidence bicycle.
fn script() -> Vec<Vec<RawDetection>> {
    let det = |class_id: i64, class_name: &str, confidence: f64, bbox: [f64; 4]| RawDetection {
        class_id,
        class_name: class_name.to_string(),
        confidence,
        bbox,
    };
    vec![
        vec![
            det(0, "person", 0.91, [20.0, 40.0, 60.0, 200.0]),
            det(0, "person", 0.84, [200.0, 50.0, 240.0, 210.0]),
        ],
        vec![det(2, "car", 0.77, [100.0, 120.0, 180.0, 170.0])],
        vec![
            det(2, "car", 0.79, [104.0, 120.0, 184.0, 170.0]),
            det(1, "bicycle", 0.31, [10.0, 150.0, 40.0, 200.0]),
        ],
    ]
}

fn synthetic_pixels(frame_number: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((FRAME_WIDTH * FRAME_HEIGHT * 3) as usize);
    for y in 0..FRAME_HEIGHT {
        for x in 0..FRAME_WIDTH {
            pixels.push(((x + frame_number) % 256) as u8);
            pixels.push((y % 256) as u8);
            pixels.push(((x + y) / 4 % 256) as u8);
        }
    }
    pixels
}
