use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::process::Command;

/// Size metrics for one artifact, in the vocabulary of the toolchain that
/// produced it. Flattened onto the build status entry as `*SizeBytes` keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeReport {
    Gnu {
        #[serde(rename = "textSizeBytes")]
        text: u64,
        #[serde(rename = "dataSizeBytes")]
        data: u64,
        #[serde(rename = "bssSizeBytes")]
        bss: u64,
    },
    ArmLink {
        #[serde(rename = "codeSizeBytes")]
        code: u64,
        #[serde(rename = "roSizeBytes")]
        ro: u64,
        #[serde(rename = "rwSizeBytes")]
        rw: u64,
        #[serde(rename = "ziSizeBytes")]
        zi: u64,
    },
}

/// Parses berkeley-format `size` output: a header line, then one data row
/// whose first three columns are text/data/bss.
pub fn parse_berkeley_size(output: &str) -> Result<SizeReport> {
    let mut lines = output.lines();
    let header = lines.next().ok_or_else(|| anyhow!("empty size output"))?;
    if !(header.contains("text") && header.contains("data") && header.contains("bss")) {
        bail!("unrecognized size header: {header:?}");
    }
    let row = lines
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| anyhow!("size output has no data row"))?;
    let mut cols = row.split_whitespace();
    let mut field = |name: &str| -> Result<u64> {
        cols.next()
            .ok_or_else(|| anyhow!("size row missing {name} column: {row:?}"))?
            .parse()
            .with_context(|| format!("size row {name} column: {row:?}"))
    };
    Ok(SizeReport::Gnu {
        text: field("text")?,
        data: field("data")?,
        bss: field("bss")?,
    })
}

/// Parses a uVision build-log size line:
/// `Program Size: Code=13784 RO-data=280 RW-data=36 ZI-data=11232`.
pub fn parse_armlink_size(line: &str) -> Result<SizeReport> {
    let rest = line
        .trim_start()
        .strip_prefix("Program Size:")
        .ok_or_else(|| anyhow!("not a Program Size line: {line:?}"))?;
    let (mut code, mut ro, mut rw, mut zi) = (None, None, None, None);
    for pair in rest.split_whitespace() {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("malformed size field {pair:?}"))?;
        let value: u64 = value
            .parse()
            .with_context(|| format!("size field {pair:?}"))?;
        match key {
            "Code" => code = Some(value),
            "RO-data" => ro = Some(value),
            "RW-data" => rw = Some(value),
            "ZI-data" => zi = Some(value),
            other => bail!("unexpected size field {other:?}"),
        }
    }
    match (code, ro, rw, zi) {
        (Some(code), Some(ro), Some(rw), Some(zi)) => {
            Ok(SizeReport::ArmLink { code, ro, rw, zi })
        }
        _ => Err(anyhow!("incomplete Program Size line: {line:?}")),
    }
}

/// Runs the external size tool on an ELF and parses its berkeley output.
pub async fn read_gnu_sizes(tool: &str, elf: &Path) -> Result<SizeReport> {
    let output = Command::new(tool)
        .arg(elf)
        .output()
        .await
        .with_context(|| format!("spawning {tool}"))?;
    if !output.status.success() {
        bail!(
            "{tool} {} failed: {}",
            elf.display(),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    parse_berkeley_size(&String::from_utf8_lossy(&output.stdout))
}
