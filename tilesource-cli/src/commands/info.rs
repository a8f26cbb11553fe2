//! `info` command: describe an archive.

use std::path::Path;

use tilesource::source::ArchiveTileSource;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Load `archive` and print what the source derived from it.
pub async fn run(runner: &CliRunner, archive: &Path) -> Result<(), CliError> {
    let source = runner.open_source(archive).await?;
    print!("{}", describe(&source));
    Ok(())
}

/// Human-readable summary of a loaded source.
pub fn describe(source: &ArchiveTileSource) -> String {
    let mut out = String::new();
    out.push_str(&format!("Archive:      {}\n", source.url()));
    out.push_str(&format!(
        "Tile kind:    {}\n",
        source
            .tile_kind()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    ));
    out.push_str(&format!(
        "Content type: {}\n",
        source.content_type().unwrap_or_else(|| "-".to_string())
    ));
    out.push_str(&format!(
        "Zoom range:   {}-{}\n",
        source.min_zoom(),
        source.max_zoom()
    ));
    match source.bounds() {
        Some(b) => out.push_str(&format!(
            "Bounds:       [{:.6}, {:.6}, {:.6}, {:.6}]\n",
            b.west, b.south, b.east, b.north
        )),
        None => out.push_str("Bounds:       (none declared)\n"),
    }
    if let Some(header) = source.header() {
        if let (Some(lon), Some(lat)) = (header.center_lon, header.center_lat) {
            out.push_str(&format!(
                "Center:       {:.6}, {:.6} @ z{}\n",
                lon,
                lat,
                header.center_zoom.unwrap_or_default()
            ));
        }
    }
    if let Some(metadata) = source.metadata() {
        let pretty =
            serde_json::to_string_pretty(metadata.as_ref()).unwrap_or_else(|_| metadata.to_string());
        out.push_str("Metadata:\n");
        for line in pretty.lines() {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}
