mod common;

use std::fs;

use link_state_routing::{ConfigError, Driver, Error, SimulationConfig};

use common::{TRIANGLE, config, topology_text};

fn reporting(node: usize) -> SimulationConfig {
    SimulationConfig {
        report_node: Some(node),
        ..config()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_runs_directives_and_prints_matrices() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input_1.txt");
    fs::write(
        &path,
        topology_text(3, TRIANGLE, &["start", "update 1 3 9", "start"]),
    )
    .unwrap();

    let mut driver = Driver::new(reporting(3), Vec::new());
    driver.run_file(&path).await.unwrap();

    let output = String::from_utf8(driver.into_inner()).unwrap();
    assert_eq!(
        output,
        "-1, 5, 7\n5, -1, 3\n7, 3, -1\n\n-1, 5, 9\n5, -1, 3\n9, 3, -1\n\n"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_paths_are_appended() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input_2.txt");
    fs::write(&path, topology_text(3, TRIANGLE, &["update 1 3 9", "start"])).unwrap();

    let mut driver = Driver::new(reporting(1), Vec::new()).with_paths(true);
    driver.run_file(&path).await.unwrap();

    let output = String::from_utf8(driver.into_inner()).unwrap();
    assert!(output.contains("node 3: 8 via [1, 2, 3]"), "{}", output);
    assert!(output.contains("node 1: 0 via [1]"), "{}", output);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_file_is_config_error_and_next_file_runs() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("bad.txt");
    let good = dir.path().join("good.txt");
    fs::write(&bad, "2\n1 5 1 9000 9001\n").unwrap();
    fs::write(&good, topology_text(2, &[(1, 2, 2.5)], &["start"])).unwrap();

    let mut driver = Driver::new(reporting(2), Vec::new()).with_seed(7);
    let err = driver.run_file(&bad).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::IdOutOfRange { id: 5, .. })
    ));

    driver.run_file(&good).await.unwrap();
    let output = String::from_utf8(driver.into_inner()).unwrap();
    assert_eq!(output, "-1, 2.5\n2.5, -1\n\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_random_report_is_a_full_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input_3.txt");
    fs::write(&path, topology_text(3, TRIANGLE, &["start"])).unwrap();

    let mut driver = Driver::new(config(), Vec::new()).with_seed(42);
    driver.run_file(&path).await.unwrap();

    // converged, so every node prints the same matrix
    let output = String::from_utf8(driver.into_inner()).unwrap();
    assert_eq!(output, "-1, 5, 7\n5, -1, 3\n7, 3, -1\n\n");
}
