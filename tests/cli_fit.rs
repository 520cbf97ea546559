use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// `id,correct,mapq,as,xs` rows where the alignment is correct when its
// score beats the second-best score
fn feature_csv(start: u64, n: u64, labelled: bool) -> String {
    let mut csv = if labelled {
        "id,correct,mapq,as,xs\n".to_string()
    } else {
        "id,mapq,as,xs\n".to_string()
    };
    for id in start..start + n {
        let as_ = -(((id * 37) % 50) as i64);
        let xs = -(((id * 11) % 60) as i64);
        let correct = as_ > xs;
        let mapq = if correct { 40 } else { 1 };
        if labelled {
            csv += &format!("{},{},{},{},{}\n", id, correct as u8, mapq, as_, xs);
        } else {
            csv += &format!("{},{},{},{}\n", id, mapq, as_, xs);
        }
    }
    csv
}

fn training_tables(dir: &Path) -> anyhow::Result<String> {
    fs::write(dir.join("training_c.csv"), feature_csv(0, 60, true))?;
    fs::write(dir.join("training_u.csv"), feature_csv(100, 30, true))?;
    Ok(dir.join("training").to_string_lossy().to_string())
}

#[test]
fn command_fit() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let training = training_tables(tempdir.path())?;
    let outdir = tempdir.path().join("out");

    let mut cmd = Command::cargo_bin("qfit")?;
    cmd.arg("fit")
        .arg(&training)
        .arg("-o")
        .arg(&outdir)
        .assert()
        .success();

    let imp = fs::read_to_string(outdir.join("featimport_c.csv"))?;
    assert_eq!(imp.lines().next(), Some("feature,importance,rank"));
    assert_eq!(imp.lines().count(), 3);
    assert!(outdir.join("featimport_u.csv").is_file());
    assert!(!outdir.join("featimport_d.csv").exists());

    let params = fs::read_to_string(outdir.join("params.csv"))?;
    let lines: Vec<&str> = params.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("model_type,subsampling_fraction,d_model_params"));
    assert!(lines[1].starts_with("ExtraTrees,1.0,NA,0,0,NA,0,0,"));
    assert!(lines[1].contains(",60,2,"));
    assert!(lines[1].ends_with(",30,2"));

    Ok(())
}

#[test]
fn command_fit_model_params() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let training = training_tables(tempdir.path())?;
    let outdir = tempdir.path().join("out");

    let mut cmd = Command::cargo_bin("qfit")?;
    cmd.arg("fit")
        .arg(&training)
        .arg("-o")
        .arg(&outdir)
        .arg("--model-family")
        .arg("logistic")
        .arg("--model-params")
        .arg("0.01:50")
        .arg("--reweight-ratio")
        .arg("4")
        .assert()
        .success();

    let params = fs::read_to_string(outdir.join("params.csv"))?;
    assert!(params.contains("0.01:50,60,2,0.01:50,30,2"));

    Ok(())
}

#[test]
fn command_fit_series() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let training = training_tables(tempdir.path())?;
    let outdir = tempdir.path().join("out");

    let mut cmd = Command::cargo_bin("qfit")?;
    cmd.arg("fit")
        .arg(&training)
        .arg("-o")
        .arg(&outdir)
        .arg("--subsampling-series")
        .arg("0.5,1.0")
        .arg("--trials")
        .arg("2")
        .arg("--model-family")
        .arg("logistic")
        .arg("--model-params")
        .arg("0:50")
        .assert()
        .success();

    for run in ["sample0.5/trial0", "sample0.5/trial1", "sample1.0/trial0", "sample1.0/trial1"] {
        assert!(outdir.join(run).join("params.csv").is_file(), "{}", run);
    }
    let params = fs::read_to_string(outdir.join("sample0.5/trial1/params.csv"))?;
    assert!(params.contains("logistic,0.5,NA,0,0,NA,0,0,0:50,30,2,0:50,15,2"));
    let params = fs::read_to_string(outdir.join("sample1.0/trial0/params.csv"))?;
    assert!(params.contains("\nlogistic,1.0,NA,0,0,NA,0,0,0:50,60,2,0:50,30,2"));

    Ok(())
}

#[test]
fn command_fit_random_forest() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let training = training_tables(tempdir.path())?;
    let outdir = tempdir.path().join("out");

    let mut cmd = Command::cargo_bin("qfit")?;
    cmd.arg("fit")
        .arg(&training)
        .arg("-o")
        .arg(&outdir)
        .arg("--model-family")
        .arg("RandomForest")
        .arg("--model-params")
        .arg("10:4:1.0")
        .assert()
        .success();

    let params = fs::read_to_string(outdir.join("params.csv"))?;
    assert!(params.contains("\nRandomForest,1.0,NA,0,0,NA,0,0,10:4:1,60,2,10:4:1,30,2"));

    Ok(())
}

#[test]
fn command_fit_bad_fraction() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let training = training_tables(tempdir.path())?;

    let mut cmd = Command::cargo_bin("qfit")?;
    cmd.arg("fit")
        .arg(&training)
        .arg("-o")
        .arg(tempdir.path().join("out"))
        .arg("--subsampling-series")
        .arg("1.5")
        .assert()
        .failure()
        .stderr(predicate::str::contains("bad subsampling fraction"));

    Ok(())
}

#[test]
fn command_fit_unknown_family() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let training = training_tables(tempdir.path())?;

    let mut cmd = Command::cargo_bin("qfit")?;
    cmd.arg("fit")
        .arg(&training)
        .arg("-o")
        .arg(tempdir.path().join("out"))
        .arg("--model-family")
        .arg("forest")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown model family `forest`"));

    Ok(())
}

#[test]
fn command_fit_unlabelled() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    fs::write(tempdir.path().join("training_c.csv"), feature_csv(0, 20, false))?;

    let mut cmd = Command::cargo_bin("qfit")?;
    cmd.arg("fit")
        .arg(tempdir.path().join("training"))
        .arg("-o")
        .arg(tempdir.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("no ground-truth `correct` labels"));

    Ok(())
}
