//! Compute unit benchmarking results and their markdown and JSON reports.

use {
    cuttle_svm::result::{TransactionResult, TransactionResultExt},
    num_format::{Locale, ToFormattedString},
    serde_json::json,
    std::{io, path::Path},
};

pub struct ComputeUnitBenchResult<'a> {
    name: &'a str,
    cus_consumed: u64,
}

impl<'a> ComputeUnitBenchResult<'a> {
    pub fn new(name: &'a str, result: &TransactionResult) -> Self {
        let cus_consumed = result.meta().compute_units_consumed;
        Self { name, cus_consumed }
    }
}

pub struct ComputeUnitMatrixBenchResult<'a> {
    harness_name: &'a str,
    results: Vec<ComputeUnitBenchResult<'a>>,
}

impl<'a> ComputeUnitMatrixBenchResult<'a> {
    pub fn new(harness_name: &'a str) -> Self {
        Self {
            harness_name,
            results: Vec::new(),
        }
    }

    pub fn add_result(&mut self, name: &'a str, result: &TransactionResult) {
        self.results
            .push(ComputeUnitBenchResult::new(name, result))
    }
}

/// Previous value of a bench, for computing deltas.
struct PreviousResult {
    name: String,
    cus_consumed: u64,
}

/// Prepend a new table to `compute_units.md` if anything changed since the
/// last run, and write the latest numbers to `compute_units.json`.
pub fn write_results(
    out_dir: &Path,
    table_header: &str,
    cuttle_version: &str,
    results: Vec<ComputeUnitBenchResult>,
) -> io::Result<()> {
    let path = out_dir.join("compute_units.md");

    // Load the existing bench content and parse the most recent table.
    let previous = if path.exists() {
        Some(parse_last_md_table(&std::fs::read_to_string(&path)?))
    } else {
        None
    };

    let mut no_changes = true;
    let mut md_table = md_header(table_header, cuttle_version);
    let mut json_results = Vec::with_capacity(results.len());

    for result in results {
        let prev = previous.as_ref().and_then(|prev_results| {
            prev_results
                .iter()
                .find(|prev_result| prev_result.name == result.name)
        });
        let delta = prev.map(|prev| result.cus_consumed as i64 - prev.cus_consumed as i64);
        let delta_cell = match delta {
            Some(0) => "--".to_string(),
            Some(delta) => {
                no_changes = false;
                if delta > 0 {
                    format!("+{}", delta.to_formatted_string(&Locale::en))
                } else {
                    delta.to_formatted_string(&Locale::en)
                }
            }
            None => {
                no_changes = false;
                "- new -".to_string()
            }
        };
        md_table.push_str(&format!(
            "| {} | {} | {} |\n",
            result.name, result.cus_consumed, delta_cell
        ));
        json_results.push(json!({
            "name": result.name,
            "cus_consumed": result.cus_consumed,
            "delta": delta,
        }));
    }

    let report = json!({
        "timestamp": table_header,
        "cuttle_version": cuttle_version,
        "results": json_results,
    });
    write_json(&out_dir.join("compute_units.json"), &report)?;

    // Only create a new table if there were changes.
    if !no_changes {
        md_table.push('\n');
        prepend_to_md_file(&path, &md_table)?;
    }
    Ok(())
}

fn md_header(table_header: &str, cuttle_version: &str) -> String {
    format!(
        r#"#### {}

Cuttle Version: {}

| Name | CUs | Delta |
|------|------|-------|
"#,
        table_header, cuttle_version,
    )
}

fn parse_last_md_table(content: &str) -> Vec<PreviousResult> {
    content
        .lines()
        .skip(6)
        .take_while(|line| !line.starts_with("####") && !line.is_empty())
        .filter_map(|line| {
            let mut parts = line.split('|').skip(1).map(str::trim);
            let name = parts.next()?.to_string();
            let cus_consumed = parts.next()?.parse().ok()?;
            Some(PreviousResult { name, cus_consumed })
        })
        .collect()
}

/// Prepend a table comparing each harness's compute units to
/// `mx_compute_units.md`, and write the same matrix to
/// `mx_compute_units.json`.
pub fn mx_write_results(
    out_dir: &Path,
    table_header: &str,
    cuttle_version: &str,
    results: &[ComputeUnitMatrixBenchResult],
) -> io::Result<()> {
    let Some(first_harness) = results.first() else {
        return Ok(());
    };
    let mut mx_md_table = mx_md_header(table_header, cuttle_version, results);

    // Rows follow the benches of the first harness.
    for (row_idx, first_bench) in first_harness.results.iter().enumerate() {
        mx_md_table.push_str(&format!("| `{}` ", first_bench.name));
        for harness in results {
            if let Some(bench) = harness.results.get(row_idx) {
                mx_md_table.push_str(&format!(
                    "| {} ",
                    bench.cus_consumed.to_formatted_string(&Locale::en)
                ));
            }
        }
        mx_md_table.push_str("|\n");
    }
    mx_md_table.push('\n');

    let report = json!({
        "timestamp": table_header,
        "cuttle_version": cuttle_version,
        "harnesses": results
            .iter()
            .map(|harness| json!({
                "name": harness.harness_name,
                "results": harness
                    .results
                    .iter()
                    .map(|bench| json!({
                        "name": bench.name,
                        "cus_consumed": bench.cus_consumed,
                    }))
                    .collect::<Vec<_>>(),
            }))
            .collect::<Vec<_>>(),
    });
    write_json(&out_dir.join("mx_compute_units.json"), &report)?;
    prepend_to_md_file(&out_dir.join("mx_compute_units.md"), &mx_md_table)
}

fn mx_md_header(
    table_header: &str,
    cuttle_version: &str,
    results: &[ComputeUnitMatrixBenchResult],
) -> String {
    // Header: | Name | CU (h1) | CU (h2) | ...
    let mut header_row = String::from("| Name ");
    for harness in results {
        header_row.push_str(&format!("| CU (`{}`) ", harness.harness_name));
    }
    header_row.push('|');

    let separator = "|----------".repeat(results.len() + 1) + "|";

    format!(
        r#"#### {}

Cuttle Version: {}

{}
{}
"#,
        table_header, cuttle_version, header_row, separator
    )
}

fn write_json(path: &Path, report: &serde_json::Value) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
    std::fs::write(path, contents)
}

fn prepend_to_md_file(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = if path.exists() {
        std::fs::read_to_string(path)?
    } else {
        String::new()
    };

    let mut new_contents = content.to_string();
    new_contents.push_str(&contents);

    std::fs::write(path, new_contents)
}
