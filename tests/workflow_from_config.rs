// tests/workflow_from_config.rs

use std::io::Write;

use critpipe::config::ConfigFile;
use critpipe::errors::CritpipeError;
use critpipe::schedule::{FileTaskSource, TaskSource};
use critpipe::workflow::{Workflow, compute_sequence};

fn parse(toml_str: &str) -> ConfigFile {
    toml::from_str(toml_str).expect("config should deserialize")
}

#[test]
fn config_stages_become_a_runnable_workflow() {
    let cfg = parse(
        r#"
        [workflow]
        root = "score"

        [stage.git]
        cmd = "collect-git"
        needs_update = true

        [stage.depsdev]
        cmd = "sync-depsdev"
        needs_update = false

        [stage.collectors]
        after = ["git", "depsdev"]

        [stage.score]
        cmd = "gen-scores"
        after = ["collectors"]
        "#,
    );

    let (wf, root) = Workflow::from_config(&cfg).unwrap();
    assert_eq!(wf.meta(root).name, "score");

    // Declaration order does not matter: `collectors` references stages
    // declared after it in the map, and is itself a passive group.
    let collectors = wf.node_by_name("collectors").unwrap();
    assert!(wf.hooks(collectors).is_passive());

    // git is stale, depsdev is not; the group and score are tainted.
    let seq = compute_sequence(&wf, root, false).unwrap();
    let names: Vec<Vec<&str>> = seq
        .iter()
        .map(|lvl| lvl.iter().map(|id| wf.meta(*id).name.as_str()).collect())
        .collect();
    assert_eq!(names, vec![vec!["git"], vec!["collectors"], vec!["score"]]);
}

#[test]
fn missing_root_is_an_error() {
    let cfg = parse(
        r#"
        [stage.score]
        cmd = "gen-scores"
        "#,
    );

    let err = Workflow::from_config(&cfg).unwrap_err();
    assert!(matches!(err, CritpipeError::ConfigError(_)));
}

#[test]
fn stage_args_carry_over_as_json() {
    let cfg = parse(
        r#"
        [workflow]
        root = "score"

        [stage.score]
        cmd = "gen-scores"
        args = { batch = 500, dry = false }
        "#,
    );

    let (wf, root) = Workflow::from_config(&cfg).unwrap();
    let args = &wf.meta(root).default_args;
    assert_eq!(args["batch"], 500);
    assert_eq!(args["dry"], false);
}

#[tokio::test]
async fn file_source_pages_through_ids_once() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "https://github.com/a/a").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "https://github.com/b/b").unwrap();
    writeln!(file, "https://github.com/c/c").unwrap();
    file.flush().unwrap();

    let source = FileTaskSource::new(file.path());

    let page = source.query(2).await.unwrap();
    assert_eq!(page, vec!["https://github.com/a/a", "https://github.com/b/b"]);

    let page = source.query(2).await.unwrap();
    assert_eq!(page, vec!["https://github.com/c/c"]);

    // Exhausted: later pages are empty, ids are never re-issued.
    assert!(source.query(2).await.unwrap().is_empty());
}
