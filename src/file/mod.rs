// graph_bulk_importer/src/file/mod.rs
// JSON-lines collection loader backed by the local file system.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{info, warn};

use crate::document::{capacity_units, to_document};
use crate::element::GraphElement;
use crate::error::{ImporterError, Result};
use crate::loader::{
    BulkImportOptions, BulkImportResponse, BulkLoader, CancelToken, LoaderConfig, prepare_import,
};

const URI_SCHEME: &str = "file://";

/// Collection metadata stored next to the documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize,)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMeta {
    pub partition_key_path: String,
    pub throughput:         u32,
}

/// Stores a collection as `<root>/<database>/<collection>.jsonl`, one graph
/// document per line.
pub struct FileLoader {
    config:     LoaderConfig,
    root:       PathBuf,
    write_lock: Mutex<(),>,
}

impl FileLoader {
    pub fn database_dir(&self,) -> PathBuf {
        self.root.join(&self.config.database_name,)
    }

    pub fn collection_path(&self,) -> PathBuf {
        self.database_dir()
            .join(format!("{}.jsonl", self.config.collection_name),)
    }

    pub fn meta_path(&self,) -> PathBuf {
        self.database_dir()
            .join(format!("{}.meta.json", self.config.collection_name),)
    }

    /// All documents currently stored in the collection.
    pub async fn read_documents(&self,) -> Result<Vec<Value,>,> {
        let path = self.collection_path();
        task::spawn_blocking(move || read_lines(&path,),)
            .await
            .map_err(|e| ImporterError::Other(format!("File loader task failed: {}", e),),)?
    }

    pub async fn read_meta(&self,) -> Result<CollectionMeta,> {
        let raw = tokio::fs::read(self.meta_path(),).await?;
        Ok(serde_json::from_slice(&raw,)?,)
    }
}

#[async_trait]
impl BulkLoader for FileLoader {
    async fn new(config: LoaderConfig,) -> Result<Self,> {
        let root = config.endpoint.trim_start_matches(URI_SCHEME,);
        if root.trim().is_empty() {
            return Err(ImporterError::ConfigurationError(
                "File loader endpoint must name a directory".to_string(),
            ),);
        }
        if config.collection_name.trim().is_empty() || config.database_name.trim().is_empty() {
            return Err(ImporterError::ConfigurationError(
                "Database and collection names are required".to_string(),
            ),);
        }

        Ok(FileLoader {
            root: PathBuf::from(root,),
            config,
            write_lock: Mutex::new((),),
        },)
    }

    fn name(&self,) -> &str {
        "file"
    }

    async fn collection_exists(&self,) -> Result<bool,> {
        Ok(tokio::fs::try_exists(self.meta_path(),).await?,)
    }

    async fn reset_collection(&self, throughput: u32,) -> Result<(),> {
        let _guard = self.write_lock.lock().await;
        remove_if_exists(&self.collection_path(),).await?;
        remove_if_exists(&self.meta_path(),).await?;

        tokio::fs::create_dir_all(self.database_dir(),).await?;
        let meta = CollectionMeta {
            partition_key_path: format!("/{}", crate::PARTITION_KEY_PROPERTY),
            throughput,
        };
        tokio::fs::write(self.meta_path(), serde_json::to_vec_pretty(&meta,)?,).await?;
        tokio::fs::write(self.collection_path(), b"",).await?;

        info!(
            "Created collection {}.{} at '{}' with {} RU/s",
            self.config.database_name,
            self.config.collection_name,
            self.collection_path().display(),
            throughput
        );
        Ok((),)
    }

    async fn drop_collection(&self,) -> Result<(),> {
        let _guard = self.write_lock.lock().await;
        remove_if_exists(&self.collection_path(),).await?;
        remove_if_exists(&self.meta_path(),).await?;

        // leave the database directory only if something else lives there
        let dir = self.database_dir();
        if tokio::fs::try_exists(&dir,).await? {
            let mut entries = tokio::fs::read_dir(&dir,).await?;
            if entries.next_entry().await?.is_none() {
                tokio::fs::remove_dir(&dir,).await?;
            }
        }
        info!(
            "Deleted collection {}.{}",
            self.config.database_name, self.config.collection_name
        );
        Ok((),)
    }

    async fn bulk_import(
        &self,
        elements: Vec<GraphElement,>,
        options: &BulkImportOptions,
        cancel: &CancelToken,
    ) -> Result<BulkImportResponse,> {
        if !self.collection_exists().await? {
            return Err(ImporterError::ConfigurationError(format!(
                "Collection {}.{} does not exist",
                self.config.database_name, self.config.collection_name
            ),),);
        }

        let started = Instant::now();
        let _guard = self.write_lock.lock().await;

        let prepared = prepare_import(elements, options,);
        let mut response = BulkImportResponse {
            bad_input_documents: prepared.bad_input_documents,
            ..Default::default()
        };

        let mut documents = self.read_documents().await?;
        let mut positions: HashMap<(String, String,), usize,> = documents
            .iter()
            .enumerate()
            .filter_map(|(i, doc,)| document_key(doc,).map(|key| (key, i,),),)
            .collect();

        for chunk in prepared.chunks {
            cancel.check()?;
            for element in chunk {
                let doc = to_document(&element,);
                let Some(key,) = document_key(&doc,) else {
                    response.bad_input_documents.push(doc,);
                    continue;
                };

                let units = capacity_units(&doc,);
                match positions.get(&key,) {
                    Some(&i,) if options.enable_upsert => documents[i] = doc,
                    Some(_,) => {
                        warn!("Conflict on id '{}' without upsert", key.0);
                        response.bad_input_documents.push(doc,);
                        continue;
                    },
                    None => {
                        positions.insert(key, documents.len(),);
                        documents.push(doc,);
                    },
                }
                response.documents_imported += 1;
                response.total_request_units_consumed += units;
            }
        }

        let path = self.collection_path();
        task::spawn_blocking(move || write_lines(&path, &documents,),)
            .await
            .map_err(|e| ImporterError::Other(format!("File loader task failed: {}", e),),)??;

        response.total_time_taken = started.elapsed();
        info!(
            "Imported {} documents into '{}'",
            response.documents_imported,
            self.collection_path().display()
        );
        Ok(response,)
    }
}

/// `(id, partition key)` identity of a stored document.
fn document_key(doc: &Value,) -> Option<(String, String,),> {
    let id = doc.get("id",)?.as_str()?.to_string();
    let partition = match doc.get(crate::PARTITION_KEY_PROPERTY,) {
        Some(Value::String(s,),) => s.clone(),
        Some(other,) => other.to_string(),
        None => String::new(),
    };
    Some((id, partition,),)
}

async fn remove_if_exists(path: &Path,) -> Result<(),> {
    match tokio::fs::remove_file(path,).await {
        Ok((),) => Ok((),),
        Err(e,) if e.kind() == std::io::ErrorKind::NotFound => Ok((),),
        Err(e,) => Err(e.into(),),
    }
}

fn read_lines(path: &Path,) -> Result<Vec<Value,>,> {
    let raw = match std::fs::read_to_string(path,) {
        Ok(raw,) => raw,
        Err(e,) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new(),),
        Err(e,) => return Err(e.into(),),
    };
    raw.lines()
        .filter(|line| !line.trim().is_empty(),)
        .map(|line| serde_json::from_str(line,).map_err(ImporterError::from,),)
        .collect()
}

fn write_lines(path: &Path, documents: &[Value],) -> Result<(),> {
    let mut out = String::new();
    for doc in documents {
        out.push_str(&serde_json::to_string(doc,)?,);
        out.push('\n',);
    }
    let tmp = path.with_extension("jsonl.tmp",);
    std::fs::write(&tmp, out,)?;
    std::fs::rename(&tmp, path,)?;
    Ok((),)
}
