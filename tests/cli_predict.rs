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

fn write_tables(dir: &Path, input_labelled: bool) -> anyhow::Result<(String, String)> {
    fs::write(dir.join("training_c.csv"), feature_csv(0, 60, true))?;
    fs::write(dir.join("training_u.csv"), feature_csv(100, 30, true))?;
    fs::write(dir.join("input_c.csv"), feature_csv(200, 25, input_labelled))?;
    fs::write(dir.join("input_u.csv"), feature_csv(300, 10, input_labelled))?;
    Ok((
        dir.join("training").to_string_lossy().to_string(),
        dir.join("input").to_string_lossy().to_string(),
    ))
}

#[test]
fn command_predict() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let (training, input) = write_tables(tempdir.path(), false)?;
    let outdir = tempdir.path().join("out");

    let mut cmd = Command::cargo_bin("qfit")?;
    cmd.arg("predict")
        .arg(&training)
        .arg(&input)
        .arg("-o")
        .arg(&outdir)
        .arg("--model-family")
        .arg("logistic")
        .arg("--model-params")
        .arg("0.001:200")
        .assert()
        .success();

    let preds = fs::read_to_string(outdir.join("predictions.csv"))?;
    let lines: Vec<&str> = preds.lines().collect();
    assert_eq!(lines[0], "id,mapq");
    assert_eq!(lines.len(), 36);

    let ids: Vec<u64> = lines[1..]
        .iter()
        .map(|l| l.split(',').next().unwrap().parse().unwrap())
        .collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
    assert_eq!(ids[0], 200);
    assert_eq!(ids[34], 309);

    for line in &lines[1..] {
        let mapq: f64 = line.split(',').nth(1).unwrap().parse()?;
        assert!((0.0..=60.0).contains(&mapq), "{}", line);
    }

    assert!(outdir.join("params.csv").is_file());
    assert!(!outdir.join("summary.csv").exists());

    Ok(())
}

#[test]
fn command_predict_no_collapse() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let (training, input) = write_tables(tempdir.path(), false)?;

    let mut outputs = vec![];
    for (name, extra) in [("collapsed", None), ("full", Some("--no-collapse"))] {
        let outdir = tempdir.path().join(name);
        let mut cmd = Command::cargo_bin("qfit")?;
        cmd.arg("predict")
            .arg(&training)
            .arg(&input)
            .arg("-o")
            .arg(&outdir)
            .arg("--model-family")
            .arg("logistic")
            .arg("--model-params")
            .arg("0:100")
            .arg("--max-rows")
            .arg("7");
        if let Some(extra) = extra {
            cmd.arg(extra);
        }
        cmd.assert().success();
        outputs.push(fs::read_to_string(outdir.join("predictions.csv"))?);
    }
    assert_eq!(outputs[0], outputs[1]);

    Ok(())
}

#[test]
fn command_predict_assess() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let (training, input) = write_tables(tempdir.path(), true)?;
    let outdir = tempdir.path().join("out");

    let mut cmd = Command::cargo_bin("qfit")?;
    cmd.arg("predict")
        .arg(&training)
        .arg(&input)
        .arg("-o")
        .arg(&outdir)
        .arg("--assess-accuracy")
        .arg("--keep-per-category")
        .arg("--predict-for-training")
        .assert()
        .success();

    // results for the input move under test/ next to training/
    for file in ["predictions.csv", "roc.csv", "roc_orig.csv", "summary.csv", "top_incorrect.csv"] {
        assert!(outdir.join("test").join(file).is_file(), "test/{}", file);
        assert!(outdir.join("training").join(file).is_file(), "training/{}", file);
        assert!(!outdir.join(file).exists(), "{}", file);
    }
    for dir in ["test/Concordant", "test/Unpaired", "training/Concordant"] {
        assert!(outdir.join(dir).join("summary.csv").is_file(), "{}", dir);
    }
    assert!(!outdir.join("test/Discordant").exists());
    assert!(outdir.join("params.csv").is_file());

    let summary = fs::read_to_string(outdir.join("test/summary.csv"))?;
    assert!(summary.starts_with("name,n,n_correct,n_incorrect,auc,auc_orig,brier,brier_orig\n"));
    assert!(summary.contains("\noverall_test,35,"));

    let summary = fs::read_to_string(outdir.join("training/summary.csv"))?;
    assert!(summary.contains("\noverall_training,90,"));

    let summary = fs::read_to_string(outdir.join("test/Unpaired/summary.csv"))?;
    assert!(summary.contains("\nUnpaired_test,10,"));

    let roc = fs::read_to_string(outdir.join("test/roc_orig.csv"))?;
    assert_eq!(roc.lines().next(), Some("mapq,cum_correct,cum_incorrect"));

    Ok(())
}

#[test]
fn command_predict_top_incorrect() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let (training, input) = write_tables(tempdir.path(), true)?;
    let outdir = tempdir.path().join("out");

    let mut cmd = Command::cargo_bin("qfit")?;
    cmd.arg("predict")
        .arg(&training)
        .arg(&input)
        .arg("-o")
        .arg(&outdir)
        .arg("--model-family")
        .arg("logistic")
        .arg("--model-params")
        .arg("0:50")
        .arg("--assess-accuracy")
        .assert()
        .success();

    // without --predict-for-training, results stay at the top level
    assert!(outdir.join("summary.csv").is_file());
    assert!(!outdir.join("test").exists());

    let top = fs::read_to_string(outdir.join("top_incorrect.csv"))?;
    let lines: Vec<&str> = top.lines().collect();
    let header = lines[0];
    assert!(header.starts_with("id,category,pcor,mapq,mapq_orig,"));
    assert!(!header.contains("feat"));
    for line in &lines[1..] {
        assert_eq!(line.split(',').count(), header.split(',').count(), "{}", line);
    }
    let names: Vec<&str> = header.split(',').skip(5).collect();
    assert!(names.iter().all(|n| ["c_as", "c_xs", "u_as", "u_xs"].contains(n)), "{}", header);

    Ok(())
}

#[test]
fn command_predict_empty_category() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let (training, input) = write_tables(tempdir.path(), true)?;
    // header-only Unpaired tables on both sides
    fs::write(tempdir.path().join("training_u.csv"), "id,correct,mapq,as,xs\n")?;
    fs::write(tempdir.path().join("input_u.csv"), "id,correct,mapq,as,xs\n")?;
    let outdir = tempdir.path().join("out");

    let mut cmd = Command::cargo_bin("qfit")?;
    cmd.arg("predict")
        .arg(&training)
        .arg(&input)
        .arg("-o")
        .arg(&outdir)
        .arg("--model-family")
        .arg("logistic")
        .arg("--model-params")
        .arg("0:50")
        .arg("--keep-per-category")
        .assert()
        .success();

    let preds = fs::read_to_string(outdir.join("predictions.csv"))?;
    assert_eq!(preds.lines().count(), 26);
    assert!(!outdir.join("featimport_u.csv").exists());

    let params = fs::read_to_string(outdir.join("params.csv"))?;
    assert!(params.contains("\nlogistic,1.0,NA,0,0,NA,0,0,0:50,60,2,NA,0,0"));

    Ok(())
}

#[test]
fn command_predict_assess_unlabelled() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let (training, input) = write_tables(tempdir.path(), false)?;
    let outdir = tempdir.path().join("out");

    let mut cmd = Command::cargo_bin("qfit")?;
    cmd.arg("predict")
        .arg(&training)
        .arg(&input)
        .arg("-o")
        .arg(&outdir)
        .arg("--model-family")
        .arg("logistic")
        .arg("--model-params")
        .arg("0:50")
        .arg("--assess-accuracy")
        .assert()
        .success();

    assert!(outdir.join("predictions.csv").is_file());
    assert!(!outdir.join("summary.csv").exists());
    assert!(!outdir.join("roc.csv").exists());

    Ok(())
}

#[test]
fn command_predict_untrained_category() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let (training, input) = write_tables(tempdir.path(), false)?;
    fs::write(tempdir.path().join("input_d.csv"), feature_csv(400, 5, false))?;

    let mut cmd = Command::cargo_bin("qfit")?;
    cmd.arg("predict")
        .arg(&training)
        .arg(&input)
        .arg("-o")
        .arg(tempdir.path().join("out"))
        .arg("--model-family")
        .arg("logistic")
        .arg("--model-params")
        .arg("0:50")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Discordant: no trained columns"));

    Ok(())
}

#[test]
fn command_predict_missing_column() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let (training, input) = write_tables(tempdir.path(), false)?;
    fs::write(tempdir.path().join("input_c.csv"), "id,mapq,as\n1,40,-3\n2,1,-20\n")?;

    let mut cmd = Command::cargo_bin("qfit")?;
    cmd.arg("predict")
        .arg(&training)
        .arg(&input)
        .arg("-o")
        .arg(tempdir.path().join("out"))
        .arg("--model-family")
        .arg("logistic")
        .arg("--model-params")
        .arg("0:50")
        .assert()
        .failure()
        .stderr(predicate::str::contains("column `xs` was in the training data"));

    Ok(())
}
