use cloudbag::prelude::*;
use quickcheck_macros::quickcheck;
use rand::{SeedableRng, rngs::StdRng};
use rstest::{fixture, rstest};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tempfile::TempDir;

struct Workspace {
    // Held so the directory outlives the test.
    _dir: TempDir,
    path: PathBuf,
}

#[fixture]
fn workspace() -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.bag");
    Workspace { _dir: dir, path }
}

fn fast_generator(seed: u64) -> FrameGenerator<StdRng, SystemClock> {
    FrameGenerator::with_rng_and_clock(
        GeneratorParams {
            delay_ms: 0,
            ..Default::default()
        },
        StdRng::seed_from_u64(seed),
        SystemClock::new(),
    )
}

fn clouds(path: &Path, topic: &str) -> Vec<(Time, PointCloud2)> {
    BagReader::open(path)
        .unwrap()
        .messages_on(topic)
        .unwrap()
        .into_iter()
        .map(|msg| (msg.time, msg.decode::<PointCloud2>().unwrap()))
        .collect()
}

#[rstest]
fn three_frames_on_points(workspace: Workspace) {
    write_random_frames(&workspace.path, "points", 3).unwrap();

    let reader = BagReader::open(&workspace.path).unwrap();
    assert_eq!(reader.message_count(), 3);
    assert_eq!(
        reader.topics(),
        vec![TopicInfo {
            name: "points".into(),
            message_type: "sensor_msgs/PointCloud2".into(),
            message_count: 3,
        }]
    );

    let clouds = clouds(&workspace.path, "points");
    assert_eq!(clouds.len(), 3);
    for (_, cloud) in &clouds {
        assert_eq!(cloud.data.len(), 160);
    }

    let first: [u8; 16] = clouds[0].1.data[..16].try_into().unwrap();
    let values: Vec<f32> = first
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    assert_eq!(values.len(), 4);
    assert!(values.iter().all(|v| (0.0..1.0).contains(v)));
}

#[rstest]
fn frames_are_spaced_by_the_delay(workspace: Workspace) {
    write_random_frames(&workspace.path, "/points", 3).unwrap();

    let reader = BagReader::open(&workspace.path).unwrap();
    // Two pauses of 100 ms separate three frames.
    assert!(reader.duration() >= Duration::from_millis(200));
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(25)]
fn every_frame_holds_ten_unit_points(workspace: Workspace, #[case] frame_count: u32) {
    fast_generator(frame_count as u64)
        .write_frames(&workspace.path, "/velodyne_points", frame_count)
        .unwrap();

    let clouds = clouds(&workspace.path, "/velodyne_points");
    assert_eq!(clouds.len(), frame_count as usize);

    for (seq, (_, cloud)) in clouds.iter().enumerate() {
        assert_eq!(cloud.header.seq, seq as u32);
        assert_eq!(cloud.header.frame_id, "velodyne");
        assert_eq!(cloud.height, 1);
        assert_eq!(cloud.width, 10);
        assert_eq!(cloud.point_step, 16);
        assert_eq!(cloud.row_step, 160);
        assert!(cloud.is_dense);
        assert!(!cloud.is_bigendian);
        assert_eq!(cloud.fields, xyzi_fields());

        let points = cloud.points().unwrap();
        assert_eq!(points.len(), 10);
        assert!(points.iter().all(PointRecord::is_unit));
    }
}

#[rstest]
fn timestamps_never_decrease(workspace: Workspace) {
    fast_generator(3)
        .write_frames(&workspace.path, "/points", 50)
        .unwrap();

    let clouds = clouds(&workspace.path, "/points");
    for pair in clouds.windows(2) {
        let ((time_a, cloud_a), (time_b, cloud_b)) = (&pair[0], &pair[1]);
        assert!(time_a <= time_b);
        assert!(cloud_a.header.stamp <= cloud_b.header.stamp);
    }
    for (time, cloud) in &clouds {
        // Capture happens before the append.
        assert!(cloud.header.stamp <= *time);
    }
}

#[rstest]
fn rerun_overwrites_previous_bag(workspace: Workspace) {
    fast_generator(1)
        .write_frames(&workspace.path, "/old", 20)
        .unwrap();
    fast_generator(2)
        .write_frames(&workspace.path, "/new", 2)
        .unwrap();

    let reader = BagReader::open(&workspace.path).unwrap();
    assert_eq!(reader.message_count(), 2);
    assert_eq!(reader.connections().len(), 1);
    assert_eq!(reader.connections()[0].topic, "/new");
    assert!(reader.messages_on("/old").unwrap().is_empty());
}

#[rstest]
fn connection_describes_point_cloud2(workspace: Workspace) {
    fast_generator(0)
        .write_frames(&workspace.path, "/points", 1)
        .unwrap();

    let reader = BagReader::open(&workspace.path).unwrap();
    let connection = &reader.connections()[0];
    assert_eq!(connection.datatype, PointCloud2::DATATYPE);
    assert_eq!(connection.md5sum, "1158d486dd51d683ce2f1be655c3c181");
    assert_eq!(connection.message_definition, PointCloud2::MESSAGE_DEFINITION);
}

#[rstest]
fn repeated_runs_share_one_node(workspace: Workspace) {
    // The second run finds the node initialized and carries on.
    fast_generator(0)
        .write_frames(&workspace.path, "/points", 1)
        .unwrap();
    fast_generator(0)
        .write_frames(&workspace.path, "/points", 1)
        .unwrap();

    assert!(cloudbag::node::name().is_some());
    assert!(matches!(
        cloudbag::node::init("again", false),
        Err(cloudbag::Error::AlreadyInitialized { .. })
    ));
    assert_eq!(BagReader::open(&workspace.path).unwrap().message_count(), 1);
}

#[rstest]
fn custom_point_count(workspace: Workspace) {
    let mut generator = FrameGenerator::with_rng_and_clock(
        GeneratorParams {
            num_points: 1000,
            frame_id: "lidar".into(),
            delay_ms: 0,
            ..Default::default()
        },
        StdRng::seed_from_u64(5),
        ManualClock::new(Time::new(100, 0), Duration::from_millis(50)),
    );
    generator
        .write_frames(&workspace.path, "/dense", 4)
        .unwrap();

    let clouds = clouds(&workspace.path, "/dense");
    assert_eq!(clouds.len(), 4);
    for (_, cloud) in &clouds {
        assert_eq!(cloud.header.frame_id, "lidar");
        assert_eq!(cloud.row_step, 16_000);
        assert_eq!(cloud.points().unwrap().len(), 1000);
    }
    // Each frame reads the clock twice: capture, then append.
    assert_eq!(clouds[0].1.header.stamp, Time::new(100, 0));
    assert_eq!(clouds[0].0, Time::new(100, 50_000_000));
    assert_eq!(clouds[3].0, Time::new(100, 350_000_000));
}

#[quickcheck]
fn entry_count_matches_frame_count(frame_count: u8, seed: u64) -> bool {
    let frame_count = frame_count as u32 % 40 + 1;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prop.bag");

    fast_generator(seed)
        .write_frames(&path, "/points", frame_count)
        .unwrap();

    let reader = BagReader::open(&path).unwrap();
    reader.message_count() == frame_count as u64
        && reader.messages_on("/points").unwrap().len() == frame_count as usize
}
