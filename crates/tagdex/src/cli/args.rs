//! Clap argument definitions for the `tagdex` CLI.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};

/// Top-level CLI options.
#[derive(Parser)]
#[command(name = "tagdex")]
#[command(about = "Tag-query search over a locally synchronized image catalog")]
pub struct Cli {
    /// Use this configuration file instead of discovering `.tagdex.toml` files
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log more (-v for debug, -vv for trace); RUST_LOG overrides
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Arguments for `tagdex search`.
#[derive(Args, Debug, Clone)]
pub struct SearchCommand {
    /// Query terms, joined with spaces; options go before the first term
    #[arg(allow_hyphen_values = true)]
    pub query: Vec<String>,

    /// Records per page [default: search.default_limit]
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Page number, starting at 1
    #[arg(long, conflicts_with = "cursor")]
    pub page: Option<usize>,

    /// Continue from the cursor returned by a previous page
    #[arg(long)]
    pub cursor: Option<String>,

    /// Flip the sort direction
    #[arg(long)]
    pub reverse: bool,

    /// Leave out a record id (repeatable)
    #[arg(long = "exclude-id", value_name = "ID")]
    pub exclude_ids: Vec<u64>,

    /// Leave out a content hash (repeatable)
    #[arg(long = "exclude-hash", value_name = "MD5")]
    pub exclude_hashes: Vec<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show the parsed query, compiled query and ordering without searching
    #[arg(long)]
    pub explain: bool,
}

/// Arguments for `tagdex sync`.
#[derive(Args, Debug, Clone)]
pub struct SyncCommand {
    /// Run a single pass and exit
    #[arg(long)]
    pub once: bool,

    /// Output the pass report in JSON format (with --once)
    #[arg(long, requires = "once")]
    pub json: bool,
}

/// Arguments for `tagdex resync`.
#[derive(Args, Debug, Clone)]
pub struct ResyncCommand {
    /// Export date (YYYY-MM-DD) [default: today, UTC]
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Output the report in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `tagdex tags`.
#[derive(Args, Debug, Clone)]
pub struct TagsCommand {
    /// Tag names; aliases resolve to their canonical tag
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Include direct implication parents
    #[arg(long)]
    pub parents: bool,

    /// Include direct implication children
    #[arg(long)]
    pub children: bool,

    /// Show every ancestor instead of direct relationships
    #[arg(long, conflicts_with_all = ["parents", "children"])]
    pub all_parents: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `tagdex init`.
#[derive(Args, Debug, Clone)]
pub struct InitCommand {
    /// Create global ~/.tagdex.toml instead
    #[arg(long)]
    pub global: bool,

    /// Overwrite existing configuration file
    #[arg(long)]
    pub force: bool,
}

/// Supported `tagdex` subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Search indexed records with a tag query
    #[command(after_help = "\
QUERY SYNTAX:
  tag               Tag must be present (aliases are followed)
  -tag              Tag must be absent
  a ~ b             At least one of a, b
  ( ... )           Group; groups nest and combine with the rest of the query
  fox*              Any tag matching the wildcard

META TAGS:
  score:>=100  favcount:10..50  width:1920  ratio:1.78  filesize:<2mb
  date:2024-01-01..  rating:s|q|e  type:png  status:pending|deleted|any
  parent:123  parent:none  ischild:true  isparent:false  source:*example.com*
  gentags:>10  spectags:1  md5:<hash>  id:<10000

ORDERING:
  order:score  order:id_asc  order:rank  order:random  randseed:42

EXAMPLES:
  tagdex search wolf -rating:e order:score
  tagdex search -n 20 'wolf ~ fox' status:any
  tagdex search --json '( canine ~ feline ) -solo'")]
    Search(SearchCommand),

    /// Keep the index in sync with the upstream catalog
    Sync(SyncCommand),

    /// Rebuild the index from the upstream daily database export
    Resync(ResyncCommand),

    /// Show tags and their implication relationships
    Tags(TagsCommand),

    /// Initialize tagdex configuration in current directory
    Init(InitCommand),

    /// Show effective configuration settings
    Config,

    /// Validate configuration and diagnose issues
    Check,
}

/// Parses CLI arguments, exiting with usage on error.
pub fn parse_cli() -> Cli {
    Cli::parse()
}
