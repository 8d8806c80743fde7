// graph_bulk_importer/src/cli.rs
// Command line for the bulk importer; every flag can also come from the
// environment.

use std::path::PathBuf;

use clap::Parser;

use crate::driver::ImportConfig;
use crate::generator::DEFAULT_STORE_PARTITION_FIELD;
use crate::loader::{BulkImportOptions, LoaderConfig};
use crate::{DEFAULT_COLLECTION_NAME, DEFAULT_COLLECTION_THROUGHPUT, DEFAULT_DATABASE_NAME};

/// Generates store vertices and edges and bulk imports them into a graph store.
#[derive(Parser, Debug,)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Where to import the generated graph.
    #[clap(subcommand)]
    pub command: Commands,

    /// Directory for the importer.log file.
    #[clap(long, env = "LOG_DIR", default_value = ".")]
    pub log_dir: PathBuf,
}

#[derive(Parser, Debug,)]
pub enum Commands {
    /// Import into Neo4j
    Neo4j(Neo4jArgs,),
    /// Import into a JSON-lines collection on disk
    File(FileArgs,),
}

#[derive(Parser, Debug,)]
pub struct CommonImportArgs {
    /// Database holding the target collection
    #[clap(long, env = "DATABASE_NAME", default_value = DEFAULT_DATABASE_NAME)]
    pub database_name: String,

    /// Target collection
    #[clap(long, env = "COLLECTION_NAME", default_value = DEFAULT_COLLECTION_NAME)]
    pub collection_name: String,

    /// Throughput provisioned when the collection is (re)created
    #[clap(long, env = "COLLECTION_THROUGHPUT", default_value_t = DEFAULT_COLLECTION_THROUGHPUT)]
    pub collection_throughput: u32,

    /// Number of store vertices (and edges) to generate
    #[clap(short = 'n', long, env = "NUMBER_OF_DOCUMENTS_TO_IMPORT", default_value_t = 1000)]
    pub count: u64,

    /// Store field used as the vertex partition key
    #[clap(long, env = "PARTITION_KEY_FIELD", default_value = DEFAULT_STORE_PARTITION_FIELD)]
    pub partition_key_field: String,

    /// Delete and recreate the collection before importing
    #[clap(long, env = "SHOULD_CLEANUP_ON_START")]
    pub cleanup_on_start: bool,

    /// Delete the collection after importing
    #[clap(long, env = "SHOULD_CLEANUP_ON_FINISH")]
    pub cleanup_on_finish: bool,

    /// Reject documents whose id already exists instead of replacing them
    #[clap(long)]
    pub no_upsert: bool,

    /// Let the loader assign ids to elements that have none
    #[clap(long)]
    pub allow_generated_ids: bool,

    /// Concurrent batches per partition key range
    #[clap(long)]
    pub max_concurrency: Option<usize,>,

    /// Elements sorted by partition key in memory at a time
    #[clap(long)]
    pub sorting_batch_size: Option<usize,>,

    /// Directory for BadVertices.txt and BadEdges.txt
    #[clap(long, env = "OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,
}

#[derive(Parser, Debug,)]
pub struct Neo4jArgs {
    /// Bolt endpoint, e.g. bolt://neo4j@localhost:7687
    #[clap(long, env = "ENDPOINT_URL")]
    pub uri:      String,
    /// Password for the endpoint user
    #[clap(long, env = "AUTHORIZATION_KEY", hide_env_values = true)]
    pub auth_key: Option<String,>,

    #[clap(flatten)]
    pub common: CommonImportArgs,
}

#[derive(Parser, Debug,)]
pub struct FileArgs {
    /// Root directory of the file store
    #[clap(short, long, env = "IMPORT_DIR")]
    pub dir: PathBuf,

    #[clap(flatten)]
    pub common: CommonImportArgs,
}

/// Generalizes over the per-loader argument types.
pub trait ImportArgs {
    fn loader_config(&self,) -> LoaderConfig;
    fn common(&self,) -> &CommonImportArgs;

    fn import_config(&self,) -> ImportConfig {
        let common = self.common();
        ImportConfig {
            loader:                self.loader_config(),
            collection_throughput: common.collection_throughput,
            documents_to_import:   common.count,
            partition_key_field:   common.partition_key_field.clone(),
            cleanup_on_start:      common.cleanup_on_start,
            cleanup_on_finish:     common.cleanup_on_finish,
            options:               BulkImportOptions {
                enable_upsert:                           !common.no_upsert,
                disable_automatic_id_generation:         !common.allow_generated_ids,
                max_concurrency_per_partition_key_range: common.max_concurrency,
                max_in_memory_sorting_batch_size:        common.sorting_batch_size,
            },
            output_dir:            common.output_dir.clone(),
        }
    }
}

impl ImportArgs for Neo4jArgs {
    fn loader_config(&self,) -> LoaderConfig {
        LoaderConfig {
            endpoint:        self.uri.clone(),
            auth_key:        self.auth_key.clone(),
            database_name:   self.common.database_name.clone(),
            collection_name: self.common.collection_name.clone(),
        }
    }

    fn common(&self,) -> &CommonImportArgs {
        &self.common
    }
}

impl ImportArgs for FileArgs {
    fn loader_config(&self,) -> LoaderConfig {
        LoaderConfig {
            endpoint:        self.dir.to_string_lossy().to_string(),
            auth_key:        None,
            database_name:   self.common.database_name.clone(),
            collection_name: self.common.collection_name.clone(),
        }
    }

    fn common(&self,) -> &CommonImportArgs {
        &self.common
    }
}
