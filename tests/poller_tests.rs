
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use compute_worker::config::PollerConfig;
use compute_worker::source::{CycleReport, Poller, TaskSource};
use test_harness::{
    function, ledger, pipeline, sandbox_config, submit_reply, task_arg, FakeRunner, Reply,
};
use tokio_util::sync::CancellationToken;

const OPEN: &str = r#"[{"base64": "", "hex": "", "number": 0}]"#;
const COMPLETED: &str = r#"[{"base64": "Ag==", "hex": "02", "number": 2}]"#;

fn fast_config(range: u64) -> PollerConfig {
    PollerConfig {
        task_range: range,
        check_interval: Duration::from_millis(1),
        cycle_interval: Duration::from_millis(1),
        ..PollerConfig::default()
    }
}

/// Ledger + runtime fake: `statuses` maps task id to its status reply,
/// `getTask` always fails so the poller falls back to its defaults.
fn chain(statuses: HashMap<u64, &'static str>) -> Arc<FakeRunner> {
    FakeRunner::new(move |program, args| match program {
        "mxpy" => match function(args) {
            Some("getTaskStatus") => task_arg(args)
                .and_then(|id| statuses.get(&id))
                .map(|s| Reply::stdout(s))
                .unwrap_or_else(|| Reply::fail("storage empty")),
            Some("getTask") => Reply::fail("decode unsupported"),
            Some("submitResult") => submit_reply(),
            _ => Reply::stdout(""),
        },
        _ => match args[0].as_str() {
            "run" => Reply::stdout("out"),
            _ => Reply::stdout(""),
        },
    })
}

fn poller(runner: Arc<FakeRunner>, config: PollerConfig) -> Poller {
    let pipeline = pipeline(sandbox_config(), runner.clone(), runner.clone());
    Poller::new(config, ledger(runner), pipeline)
}

#[tokio::test]
async fn test_cycle_processes_only_open_tasks() {
    let runner = chain(HashMap::from([(0, COMPLETED), (1, OPEN), (3, OPEN)]));
    let poller = poller(runner.clone(), fast_config(5));

    let report = poller.poll_cycle(&CancellationToken::new()).await;

    assert_eq!(
        report,
        CycleReport {
            scanned: 5,
            skipped: 0,
            open: 2,
            submitted: 2,
            failed: 0,
        }
    );
    assert_eq!(runner.count("docker", "run"), 2);
    assert_eq!(runner.count("docker", "rmi"), 2);
}

#[tokio::test]
async fn test_submitted_tasks_are_skipped_next_cycle() {
    let runner = chain(HashMap::from([(1, OPEN), (2, OPEN)]));
    let poller = poller(runner.clone(), fast_config(4));
    let token = CancellationToken::new();

    poller.poll_cycle(&token).await;
    let status_queries = runner.count("mxpy", "query");
    let second = poller.poll_cycle(&token).await;

    assert_eq!(second.skipped, 2);
    assert_eq!(second.scanned, 2);
    assert_eq!(second.submitted, 0);
    // Only ids 0 and 3 are queried again (status, no details)
    assert_eq!(runner.count("mxpy", "query") - status_queries, 2);
    assert_eq!(runner.count("docker", "run"), 2);
}

#[tokio::test]
async fn test_failed_task_is_retried_next_cycle() {
    let fail_first = Arc::new(Mutex::new(true));
    let flag = fail_first.clone();
    let runner = FakeRunner::new(move |program, args| match program {
        "mxpy" => match function(args) {
            Some("getTaskStatus") => Reply::stdout(OPEN),
            Some("submitResult") => {
                let mut first = flag.lock().unwrap();
                if *first {
                    *first = false;
                    Reply::stdout("")
                } else {
                    submit_reply()
                }
            }
            _ => Reply::fail("no details"),
        },
        _ => match args[0].as_str() {
            "run" => Reply::stdout("out"),
            _ => Reply::stdout(""),
        },
    });
    let poller = poller(runner.clone(), fast_config(1));
    let token = CancellationToken::new();

    let first = poller.poll_cycle(&token).await;
    let second = poller.poll_cycle(&token).await;
    let third = poller.poll_cycle(&token).await;

    assert_eq!(first.failed, 1);
    assert_eq!(second.submitted, 1);
    assert_eq!(third.skipped, 1);
    assert_eq!(runner.count("docker", "run"), 2);
}

#[tokio::test]
async fn test_on_chain_details_drive_image_and_input() {
    let mut encoded = vec![1u8; 32];
    for field in [&b"curator:2"[..], &b"{\"rows\":[]}"[..], &[0x01][..]] {
        encoded.extend_from_slice(&(field.len() as u32).to_be_bytes());
        encoded.extend_from_slice(field);
    }
    encoded.extend_from_slice(&3u32.to_be_bytes());
    encoded.extend_from_slice(&0u32.to_be_bytes());
    encoded.push(0);
    let details: &'static str = Box::leak(
        format!(r#"[{{"hex": "{}"}}]"#, hex::encode(&encoded)).into_boxed_str(),
    );

    let runner = FakeRunner::new(move |program, args| match program {
        "mxpy" => match function(args) {
            Some("getTaskStatus") => Reply::stdout(OPEN),
            Some("getTask") => Reply::stdout(details),
            Some("submitResult") => submit_reply(),
            _ => Reply::stdout(""),
        },
        _ => match args[0].as_str() {
            "run" => Reply::stdout("[]"),
            _ => Reply::stdout(""),
        },
    });
    let poller = poller(runner.clone(), fast_config(1));

    poller.poll_cycle(&CancellationToken::new()).await;

    let run = runner
        .calls()
        .into_iter()
        .find(|c| c.program == "docker" && c.verb() == Some("run"))
        .unwrap();
    assert_eq!(&run.args[run.args.len() - 2..], &["curator:2", "{\"rows\":[]}"]);
}

#[tokio::test]
async fn test_forced_defaults_skip_details_lookup() {
    let runner = chain(HashMap::from([(0, OPEN)]));
    let config = PollerConfig {
        force_defaults: true,
        default_image: "override:1".to_string(),
        default_input: "custom".to_string(),
        ..fast_config(1)
    };
    let poller = poller(runner.clone(), config);

    poller.poll_cycle(&CancellationToken::new()).await;

    assert!(runner
        .calls()
        .iter()
        .all(|c| function(&c.args) != Some("getTask")));
    let run = runner
        .calls()
        .into_iter()
        .find(|c| c.verb() == Some("run"))
        .unwrap();
    assert_eq!(&run.args[run.args.len() - 2..], &["override:1", "custom"]);
}

#[tokio::test]
async fn test_status_errors_are_contained() {
    let runner = FakeRunner::new(|_, _| Reply::fail("gateway unreachable"));
    let poller = poller(runner.clone(), fast_config(3));

    let report = poller.poll_cycle(&CancellationToken::new()).await;

    assert_eq!(report.scanned, 3);
    assert_eq!(report.open, 0);
    assert_eq!(runner.count("docker", "run"), 0);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let runner = chain(HashMap::new());
    let mut poller = poller(runner, fast_config(2));
    let token = CancellationToken::new();

    let handle = tokio::spawn({
        let token = token.clone();
        async move { poller.run(token).await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    token.cancel();

    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("poller should stop promptly")
        .unwrap();
    assert!(result.is_ok());
}
