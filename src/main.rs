use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use content::{Corpus, ModData, ModId, ModSet, Record};
use itertools::Itertools;
use loot::{Guide, LootKind};
use serde_json::Value;
use util::Uninterrupted;

#[derive(Parser, Debug)]
#[command(about = "Query a roguelike content corpus without playing it")]
struct Args {
    /// Corpus root, a JSON file or a directory tree of JSON files.
    path: PathBuf,

    #[arg(
        long,
        value_delimiter = ',',
        help = "Comma-separated list of mod ids to overlay"
    )]
    mods: Vec<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print one flattened record as JSON.
    Lookup { type_tag: String, id: String },
    /// List the keys of a type.
    List { type_tag: String },
    /// Distribution over an overmap special.
    Loot {
        special: String,
        #[arg(long, default_value = "items", help = "items, furniture or terrain")]
        kind: String,
    },
    /// Group overmap specials by their world-map appearance.
    Appearances,
    /// Which mods touched a key.
    Mods { type_tag: String, id: String },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let corpus = load_corpus(&args.path, &args.mods)?;
    let guide = Guide::new(corpus);

    match args.cmd {
        Cmd::Lookup { type_tag, id } => {
            let record = guide.resolve(&type_tag, &id)?;
            println!("{}", serde_json::to_string_pretty(record.fields())?);
        }
        Cmd::List { type_tag } => {
            for (key, _) in guide.corpus().store().keys_of_type(&type_tag) {
                println!("{key}");
            }
        }
        Cmd::Loot { special, kind } => {
            let kind: LootKind = kind
                .parse()
                .map_err(|_| anyhow::anyhow!("unknown kind: {kind}"))?;
            let loot = guide.distribution_for_special(kind, &special, &mut Uninterrupted)?;
            for (id, chance) in loot
                .iter()
                .sorted_by(|a, b| b.1.expected.total_cmp(&a.1.expected))
            {
                println!("{:>6.2}% {:>10.3}  {id}", chance.prob * 100.0, chance.expected);
            }
        }
        Cmd::Appearances => {
            for (appearance, ids) in guide.group_specials_by_appearance(&mut Uninterrupted) {
                println!("{appearance}");
                for id in ids {
                    println!("    {id}");
                }
            }
        }
        Cmd::Mods { type_tag, id } => {
            println!("direct: {}", guide.direct_mods(&type_tag, &id).iter().join(", "));
            println!(
                "contributing: {}",
                guide.contributing_mods(&type_tag, &id).iter().join(", ")
            );
        }
    }

    Ok(())
}

/// Load a corpus from a single file, or from a directory tree where any
/// directory holding a `MOD_INFO` record is a mod and the rest is core.
fn load_corpus(root: &Path, selected: &[String]) -> Result<Corpus> {
    if root.is_file() {
        return Ok(Corpus::from_records(records_in(root)?));
    }

    let mut files = Vec::new();
    collect_json_files(root, &mut files)
        .with_context(|| format!("scanning {}", root.display()))?;
    files.sort();

    let mut streams: Vec<(PathBuf, Vec<Record>)> = Vec::new();
    for file in files {
        let records =
            records_in(&file).with_context(|| format!("loading {}", file.display()))?;
        streams.push((file, records));
    }

    // Any directory with a manifest record is a mod root.
    let mod_roots: Vec<PathBuf> = streams
        .iter()
        .filter(|(_, records)| records.iter().any(|r| r.type_tag() == "MOD_INFO"))
        .filter_map(|(file, _)| file.parent().map(Path::to_path_buf))
        .collect();

    let mut core = Vec::new();
    let mut mods: Vec<(PathBuf, Vec<Record>)> = Vec::new();
    for (file, records) in streams {
        // Deepest mod root wins for nested layouts.
        let owner = mod_roots
            .iter()
            .filter(|root| file.starts_with(root))
            .max_by_key(|root| root.components().count());
        match owner {
            Some(root) => match mods.iter_mut().find(|(r, _)| r == root) {
                Some((_, stream)) => stream.extend(records),
                None => mods.push((root.clone(), records)),
            },
            None => core.extend(records),
        }
    }

    let mut set = ModSet::new(ModData::new("core", core));
    for (root, stream) in mods {
        match ModData::from_records(stream) {
            Some(data) => set.insert(data),
            None => log::warn!("{}: mod manifest did not parse", root.display()),
        }
    }

    let selected: Vec<ModId> = selected.iter().map(|m| ModId::from(m.as_str())).collect();
    set.corpus(&selected, &mut Uninterrupted)
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_json_files(&path, out)?;
        } else if path.extension().is_some_and(|e| e == "json") {
            out.push(path);
        }
    }
    Ok(())
}

fn records_in(path: &Path) -> Result<Vec<Record>> {
    let text = fs::read_to_string(path)?;
    let v: Value = serde_json::from_str(&text)?;
    match v {
        Value::Array(items) => items
            .into_iter()
            .map(|item| {
                Record::from_value(item).context("corpus entries must be JSON objects")
            })
            .collect(),
        Value::Object(fields) => Ok(vec![Record::from(fields)]),
        _ => bail!("{}: expected a JSON record or array of records", path.display()),
    }
}
