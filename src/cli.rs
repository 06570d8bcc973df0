use std::cmp;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use atty::Stream;
use cdsf_gloss::{
    Annotator, Detection, Dictionary, DictionaryEntry, Layers, LookupResult, MatchConfig,
};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "cdsf-gloss",
    about = "Look up words and detect dictionary words in sentences",
    version
)]
pub struct Cli {
    /// Emit JSON instead of human-readable tables.
    #[arg(long, global = true)]
    json: bool,

    /// Dictionary file (.json or .jsonl, optionally .zst). Defaults to the bundled sample.
    #[arg(long, short = 'd', global = true)]
    dictionary: Option<PathBuf>,

    #[command(flatten)]
    matching: MatchArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct MatchArgs {
    /// Shortest token (in characters) eligible for fuzzy matching.
    #[arg(long, global = true, default_value_t = MatchConfig::default().min_fuzzy_len)]
    min_fuzzy_len: usize,

    /// Largest edit distance accepted by the fuzzy fallback.
    #[arg(long, global = true, default_value_t = MatchConfig::default().max_edit_distance)]
    max_edit_distance: usize,

    /// Disable inflection stripping (graces -> grace) before edit distance.
    #[arg(long, global = true)]
    no_inflections: bool,
}

impl MatchArgs {
    fn config(&self) -> MatchConfig {
        MatchConfig {
            min_fuzzy_len: self.min_fuzzy_len,
            max_edit_distance: self.max_edit_distance,
            strip_inflections: !self.no_inflections,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a single word, with fuzzy fallback.
    Lookup {
        /// Word to look up.
        word: String,
    },
    /// Find dictionary words in a sentence.
    Detect {
        /// Sentence to analyse; multiple arguments are joined with spaces.
        #[arg(required = true)]
        sentence: Vec<String>,
    },
    /// List dictionary words that start with the provided prefix.
    Prefix {
        /// Prefix to search for.
        prefix: String,
        /// Maximum number of matches to return.
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Show the stored entry for a word (exact match only).
    Show {
        /// Word to display.
        word: String,
    },
    /// Serve the lookup and detect endpoints over HTTP.
    #[cfg(feature = "web")]
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1:5000")]
        addr: std::net::SocketAddr,
        /// Allowed CORS origin; repeat for several. Any origin when omitted.
        #[arg(long = "allow-origin")]
        allow_origins: Vec<String>,
        /// Number of lookup results kept in the LRU cache (0 disables it).
        #[arg(long, default_value_t = 1024)]
        cache_size: usize,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.command);

    let dictionary = load_dictionary(cli.dictionary.as_ref())?;
    let annotator = Annotator::new(dictionary.clone(), cli.matching.config());

    match cli.command {
        Command::Lookup { word } => handle_lookup(&annotator, &word, cli.json),
        Command::Detect { sentence } => handle_detect(&annotator, &sentence.join(" "), cli.json),
        Command::Prefix { prefix, limit } => handle_prefix(&dictionary, &prefix, limit, cli.json),
        Command::Show { word } => handle_show(&dictionary, &word, cli.json),
        #[cfg(feature = "web")]
        Command::Serve {
            addr,
            allow_origins,
            cache_size,
        } => handle_serve(annotator, addr, allow_origins, cache_size),
    }
}

fn init_tracing(command: &Command) {
    let default_level = match command {
        #[cfg(feature = "web")]
        Command::Serve { .. } => "info",
        _ => "warn",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_dictionary(path: Option<&PathBuf>) -> Result<Arc<Dictionary>, Box<dyn Error>> {
    match path {
        Some(path) => {
            let dictionary = Dictionary::from_path(path)
                .map_err(|err| format!("Failed to load {}: {err}", path.display()))?;
            Ok(Arc::new(dictionary))
        }
        None => Ok(cdsf_gloss::bundled()),
    }
}

fn handle_lookup(annotator: &Annotator, word: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    let result = annotator.lookup(word);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&lookup_to_json(&result))?);
        return Ok(());
    }
    match &result {
        LookupResult::Found(resolution) => {
            println!(
                "{} -> {} ({}, similarity {})",
                word.trim(),
                resolution.matched_word(),
                resolution.strategy(),
                resolution.similarity()
            );
            print_layers(resolution.data());
        }
        LookupResult::Missing(failure) => println!("{}", failure.message),
    }
    Ok(())
}

fn handle_detect(
    annotator: &Annotator,
    sentence: &str,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let detection = annotator.detect(sentence);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&detection_to_json(&detection))?);
        return Ok(());
    }
    if detection.is_empty() {
        println!("No dictionary words detected.");
        return Ok(());
    }
    println!("{}", highlight(&detection));
    for found in detection.matches() {
        println!(
            "\n{} -> {} ({}, similarity {})",
            found.surface_token(),
            found.matched_word(),
            found.strategy(),
            found.similarity()
        );
        print_layers(found.data());
    }
    Ok(())
}

fn handle_prefix(
    dictionary: &Dictionary,
    prefix: &str,
    limit: usize,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let limit = cmp::max(1, limit);
    let matches = dictionary.prefix(prefix, limit);

    if as_json {
        let payload = json!({
            "prefix": prefix,
            "limit": limit,
            "results": matches.iter().map(|entry| {
                json!({"word": entry.word(), "layers": entry.layers().len()})
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_prefix_table(prefix, &matches);
    }
    Ok(())
}

fn handle_show(dictionary: &Dictionary, word: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    let entry = dictionary
        .get(word)
        .ok_or_else(|| format!("No entry found for word {word:?}"))?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&entry_to_json(entry))?);
    } else {
        println!("Word: {}", entry.word());
        print_layers(entry.layers());
    }
    Ok(())
}

#[cfg(feature = "web")]
fn handle_serve(
    annotator: Annotator,
    addr: std::net::SocketAddr,
    allowed_origins: Vec<String>,
    cache_size: usize,
) -> Result<(), Box<dyn Error>> {
    let config = cdsf_gloss::web::WebConfig {
        addr,
        allowed_origins,
        cache_size,
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(cdsf_gloss::web::serve(config, annotator))?;
    Ok(())
}

fn lookup_to_json(result: &LookupResult) -> serde_json::Value {
    match result {
        LookupResult::Found(resolution) => json!({
            "found": true,
            "matched_word": resolution.matched_word(),
            "strategy": resolution.strategy(),
            "similarity": resolution.similarity(),
            "data": resolution.data(),
        }),
        LookupResult::Missing(failure) => json!({
            "found": false,
            "reason": failure.kind,
            "message": failure.message,
        }),
    }
}

fn detection_to_json(detection: &Detection) -> serde_json::Value {
    json!({
        "sentence": detection.sentence(),
        "matches": detection.matches().iter().map(|found| {
            json!({
                "word": found.surface_token(),
                "matched_word": found.matched_word(),
                "strategy": found.strategy(),
                "similarity": found.similarity(),
                "data": found.data(),
            })
        }).collect::<Vec<_>>(),
    })
}

fn entry_to_json(entry: &DictionaryEntry) -> serde_json::Value {
    json!({
        "word": entry.word(),
        "key": entry.key(),
        "layers": entry.layers(),
    })
}

/// The sentence with every matched occurrence wrapped in brackets.
fn highlight(detection: &Detection) -> String {
    detection
        .segments()
        .iter()
        .map(|segment| match segment.match_index {
            Some(_) => format!("[{}]", segment.text),
            None => segment.text.clone(),
        })
        .collect()
}

fn print_prefix_table(prefix: &str, rows: &[&DictionaryEntry]) {
    if rows.is_empty() {
        println!("No words matched prefix \"{prefix}\".");
        return;
    }
    let width = rows
        .iter()
        .map(|entry| entry.word().len())
        .max()
        .unwrap_or(prefix.len())
        .max("WORD".len());
    println!("Matches for prefix \"{prefix}\":");
    println!("{:<width$}  {}", "WORD", "LAYERS", width = width);
    println!("{:-<width$}  {}", "", "------", width = width);
    for entry in rows {
        println!("{:<width$}  {}", entry.word(), entry.layers().len(), width = width);
    }
}

fn print_layers(layers: &Layers) {
    if layers.is_empty() {
        println!("  (no layers)");
        return;
    }
    if stdout_is_tty() {
        let skin = markdown_skin();
        let markdown = layers_markdown(layers);
        let formatted = FmtText::from(&skin, &markdown, Some(markdown_width()));
        println!("{formatted}");
        return;
    }
    let width = layers
        .names()
        .map(str::len)
        .max()
        .unwrap_or(0)
        .max("LAYER".len());
    println!("{:<width$}  {}", "LAYER", "DETAILS", width = width);
    println!("{:-<width$}  {}", "", "-------", width = width);
    for (name, detail) in layers.iter() {
        println!("{:<width$}  {}", name, detail, width = width);
    }
}

fn layers_markdown(layers: &Layers) -> String {
    let mut table = String::from("|CDSF Layer|Details|\n|:-|:-|\n");
    for (name, detail) in layers.iter() {
        table.push_str(&format!(
            "|**{}**|{}|\n",
            name.replace('|', "\\|"),
            detail.replace('|', "\\|")
        ));
    }
    table
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn markdown_skin() -> MadSkin {
    MadSkin::default()
}
