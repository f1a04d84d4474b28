use std::{
    path::{Path, PathBuf},
    str::FromStr,
};
use structopt::StructOpt;
use tracing::{info, Level};

use histree::{ArrayStore, HistoryTree, MemStore, NodeStore};
use histree_utils::{dump, error::Error, Sha256Agg, Sha256Digest};

pub type Result<T> = anyhow::Result<T>;

type Tree<S> = HistoryTree<Sha256Agg, S>;

/// node storage used for the loaded tree
#[derive(Debug, Clone, Copy)]
enum Storage {
    /// hash map keyed by address, good for pruned trees
    Hash,
    /// in order array, good for complete trees
    Array,
}

impl FromStr for Storage {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hash" => Ok(Self::Hash),
            "array" => Ok(Self::Array),
            x => Err(Error::UnsupportedStorage(x.into()).into()),
        }
    }
}

#[derive(StructOpt)]
#[structopt(about = "CLI to work with history trees")]
struct Opts {
    #[structopt(short, parse(from_occurrences = set_log_level), global = true)]
    #[allow(dead_code)] // log level will be set in [`set_log_level`]
    /// Increase verbosity
    verbosity: u64,
    #[structopt(long, default_value = "hash", global = true)]
    /// Node storage, possible options "hash" (for sparse and pruned trees) or "array" (for
    /// complete trees)
    storage: Storage,
    #[structopt(subcommand)]
    cmd: Command,
}

fn set_log_level(verbosity: u64) -> u64 {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
    verbosity
}

#[derive(StructOpt)]
enum Command {
    /// Build a tree from the numbers 0..count and write it to a file
    Build {
        #[structopt(long)]
        /// The number of values
        count: u64,
        #[structopt(long)]
        /// File to write the encoded tree to
        output: PathBuf,
    },
    /// Print a tree, one node per line
    Dump {
        #[structopt(long)]
        /// The encoded tree
        input: PathBuf,
    },
    /// Print a tree as dot. Can be piped directly:
    /// `histree-cli graph --input <..> | dot -Tpng -o output.png`.
    /// Branches are depicted as rectangles, leafs as circles. Frozen nodes are
    /// greyed out, aggregate only stubs are dashed.
    Graph {
        #[structopt(long)]
        /// The encoded tree
        input: PathBuf,
    },
    /// Print an encoded tree as dag-json
    Json {
        #[structopt(long)]
        /// The encoded tree
        input: PathBuf,
    },
    /// Keep only the paths to some versions of a tree
    Prune {
        #[structopt(long)]
        /// The encoded tree
        input: PathBuf,
        #[structopt(long)]
        /// Versions to keep
        keep: Vec<u64>,
        #[structopt(long)]
        /// Keep the values of the kept leaves, not just their aggregates
        values: bool,
        #[structopt(long)]
        /// File to write the pruned tree to
        output: PathBuf,
    },
    /// Print the commitment of a tree
    Commitment {
        #[structopt(long)]
        /// The encoded tree
        input: PathBuf,
        #[structopt(long)]
        /// Version of the commitment, the current version if omitted
        version: Option<u64>,
    },
}

fn load<S>(input: &Path, store: S) -> Result<Tree<S>>
where
    S: NodeStore<Sha256Digest, Vec<u8>>,
{
    let data = std::fs::read(input)?;
    let tree = Tree::parse(Sha256Agg, store, &data)?;
    info!("loaded tree {:?} from {}", tree, input.display());
    Ok(tree)
}

fn build<S>(count: u64, store: S) -> Tree<S>
where
    S: NodeStore<Sha256Digest, Vec<u8>>,
{
    let print_every = (count / 10).max(1);
    let mut tree = Tree::new(Sha256Agg, store);
    for i in 0..count {
        if i % print_every == 0 {
            info!("{}", i);
        }
        tree.append(i.to_string().into_bytes());
    }
    tree.assert_invariants();
    tree
}

fn print_commitment<S>(tree: &Tree<S>, version: Option<u64>) -> Result<()>
where
    S: NodeStore<Sha256Digest, Vec<u8>>,
{
    let version = match version.or_else(|| tree.version()) {
        Some(version) => version,
        None => {
            println!("empty tree");
            return Ok(());
        }
    };
    anyhow::ensure!(
        tree.version().map(|v| version <= v).unwrap_or_default(),
        "version {} is beyond the tree version {:?}",
        version,
        tree.version()
    );
    match tree.agg_at(version) {
        Some(agg) => println!("{}\t{}", version, agg),
        None => anyhow::bail!("commitment for {} was pruned away", version),
    }
    Ok(())
}

fn run<S>(cmd: Command, store: impl Fn() -> S) -> Result<()>
where
    S: NodeStore<Sha256Digest, Vec<u8>>,
{
    match cmd {
        Command::Build { count, output } => {
            let tree = build(count, store());
            std::fs::write(&output, tree.serialize_bytes()?)?;
            print_commitment(&tree, None)?;
        }
        Command::Dump { input } => {
            let tree = load(&input, store())?;
            print!("{}", tree);
        }
        Command::Graph { input } => {
            let tree = load(&input, store())?;
            let mut stdout = std::io::stdout();
            dump::graph(&tree, &mut stdout)?;
        }
        Command::Json { input } => {
            let data = std::fs::read(&input)?;
            dump::dump_json(&data, std::io::stdout())?;
        }
        Command::Prune {
            input,
            keep,
            values,
            output,
        } => {
            let tree = load(&input, store())?;
            let mut pruned = tree.make_pruned(MemStore::new());
            for version in keep {
                anyhow::ensure!(
                    tree.find_leaf(version).is_some(),
                    Error::MissingLeaf(version)
                );
                pruned.copy_path(&tree, version, values);
            }
            let data = pruned.serialize_bytes()?;
            info!(
                "pruned tree has {} of {} nodes, {} bytes",
                pruned.store().len(),
                tree.store().len(),
                data.len()
            );
            std::fs::write(&output, data)?;
        }
        Command::Commitment { input, version } => {
            let tree = load(&input, store())?;
            print_commitment(&tree, version)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let opts = Opts::from_args();
    match opts.storage {
        Storage::Hash => run(opts.cmd, MemStore::new),
        Storage::Array => run(opts.cmd, ArrayStore::new),
    }
}
