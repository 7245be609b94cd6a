use anyhow::Context;
use clap::Parser;
use cloudbag::{
    bag::{BagReader, TopicInfo},
    cloud::PointCloud2,
    msg::RosMessage,
};
use rayon::prelude::*;
use std::{fmt, path::PathBuf};
use tabled::{Table, Tabled, settings::Style};
use tracing_subscriber::EnvFilter;

#[derive(Tabled)]
struct TopicRow {
    topic_name: String,
    message_type: String,
    message_count: u64,
}

impl From<TopicInfo> for TopicRow {
    fn from(topic_info: TopicInfo) -> Self {
        Self {
            topic_name: topic_info.name,
            message_type: topic_info.message_type,
            message_count: topic_info.message_count,
        }
    }
}

#[derive(Tabled)]
struct CloudRow {
    topic_name: String,
    clouds: usize,
    points: usize,
    all_unit: bool,
    min: String,
    max: String,
}

struct CompressionMode(String);

impl fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Option<&str>> for CompressionMode {
    fn from(option: Option<&str>) -> Self {
        match option {
            Some(buf) => Self(buf.to_string()),
            None => Self("none".to_string()),
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let args = Args::parse();

    let reader = BagReader::open(&args.bag)
        .with_context(|| format!("failed to read bag {}", args.bag.display()))?;

    const WIDTH: usize = 20;
    println!("{:WIDTH$} {}", "path", args.bag.display());
    println!("{:WIDTH$} {}", "message_count", reader.message_count());
    println!(
        "{:WIDTH$} {:.2}s",
        "duration",
        reader.duration().as_secs_f64()
    );
    println!("{:WIDTH$} {}", "is_compressed", reader.is_compressed());
    println!(
        "{:WIDTH$} {}",
        "compression_mode",
        CompressionMode::from(reader.compression_mode())
    );

    let topic_rows = reader.topics().into_iter().map(TopicRow::from);
    let mut topic_table = Table::new(topic_rows);
    topic_table.with(Style::sharp());
    println!("{}", topic_table);

    if args.clouds {
        let cloud_rows = cloud_rows(&reader)?;
        let mut cloud_table = Table::new(cloud_rows);
        cloud_table.with(Style::sharp());
        println!("{}", cloud_table);
    }

    Ok(())
}

/// Decodes every point cloud and summarizes the points on each topic.
fn cloud_rows(reader: &BagReader) -> anyhow::Result<Vec<CloudRow>> {
    let messages = reader.messages()?;
    let mut rows = Vec::new();

    for topic in reader.topics() {
        if topic.message_type != PointCloud2::DATATYPE {
            continue;
        }

        let points = messages
            .par_iter()
            .filter(|msg| msg.topic == topic.name)
            .map(|msg| msg.decode::<PointCloud2>()?.points())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("decoding clouds on {}", topic.name))?;

        let clouds = points.len();
        let points: Vec<_> = points.into_iter().flatten().collect();
        let (min, max) = points.par_iter().map(|p| (p.as_array(), p.as_array())).reduce(
            || ([f32::INFINITY; 4], [f32::NEG_INFINITY; 4]),
            |(min_a, max_a), (min_b, max_b)| {
                (
                    std::array::from_fn(|i| min_a[i].min(min_b[i])),
                    std::array::from_fn(|i| max_a[i].max(max_b[i])),
                )
            },
        );

        rows.push(CloudRow {
            topic_name: topic.name,
            clouds,
            points: points.len(),
            all_unit: points.par_iter().all(|p| p.is_unit()),
            min: format!("{min:.3?}"),
            max: format!("{max:.3?}"),
        });
    }

    Ok(rows)
}

#[derive(Parser)]
#[command(about, long_about = None)]
struct Args {
    bag: PathBuf,

    /// Decode every point cloud and summarize its points.
    #[arg(short, long)]
    clouds: bool,
}
