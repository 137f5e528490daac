//! `dxsync manifest`: manifest inspection.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};
use tracing::info;

use dxsync_core::{manifest, ArtifactType, Manifest, ManifestOptions, ManifestStore, Section};

#[derive(Subcommand, Debug)]
pub enum ManifestCommand {
    /// Print each section of a manifest with its item count.
    Show {
        /// Manifest name (resolved under `assets/dxconfig/manifests/`) or path.
        name: String,

        /// Working directory the manifest belongs to.
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

pub fn run(command: ManifestCommand) -> Result<()> {
    match command {
        ManifestCommand::Show { name, dir } => show(&name, &dir),
    }
}

#[derive(Tabled)]
struct SectionRow {
    #[tabled(rename = "section")]
    section: String,
    #[tabled(rename = "items")]
    items: usize,
}

fn show(name: &str, dir: &Path) -> Result<()> {
    info!(manifest = name, dir = %dir.display(), "showing manifest");
    let options = ManifestOptions {
        read: Some(name.to_owned()),
        ..ManifestOptions::default()
    };
    let store = ManifestStore::initialize(dir, &options, None)
        .with_context(|| format!("failed to load manifest '{name}'"))?;
    let Some(read) = store.read_manifest() else {
        anyhow::bail!("manifest '{name}' not loaded");
    };

    let rows = section_rows(read);
    info!(sections = rows.len(), "manifest loaded");
    println!(
        "{} {}",
        "Manifest".bold(),
        manifest::resolve_path_at(dir, name).display()
    );
    if rows.is_empty() {
        println!("No sections.");
        return Ok(());
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn section_rows(read: &Manifest) -> Vec<SectionRow> {
    let mut rows = Vec::new();
    for t in ArtifactType::ALL {
        match read.raw_section(t) {
            Some(Section::SiteScoped(by_site)) => {
                for (site, items) in by_site {
                    rows.push(SectionRow {
                        section: format!("{}/{}", t.section_name(), site),
                        items: items.len(),
                    });
                }
            }
            Some(section) => rows.push(SectionRow {
                section: t.section_name().to_owned(),
                items: section.len(),
            }),
            None => {}
        }
    }
    for (name, value) in read.extra_sections() {
        rows.push(SectionRow {
            section: format!("{name} (unrecognised)"),
            items: value.as_object().map_or(0, |m| m.len()),
        });
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxsync_core::{ManifestItem, SiteId};

    #[test]
    fn pages_are_listed_per_site() {
        let mut m = Manifest::new();
        m.append(
            ArtifactType::Pages,
            &[ManifestItem::new("p1", "home", "/home")],
            &SiteId::from("s1"),
        );
        m.append(
            ArtifactType::Content,
            &[
                ManifestItem::new("c1", "a", "/a"),
                ManifestItem::new("c2", "b", "/b"),
            ],
            &SiteId::default(),
        );

        let rows = section_rows(&m);
        let summary: Vec<(String, usize)> =
            rows.into_iter().map(|r| (r.section, r.items)).collect();
        assert_eq!(
            summary,
            vec![
                ("content".to_owned(), 2),
                ("sites".to_owned(), 1),
                ("pages/s1".to_owned(), 1),
            ]
        );
    }
}
