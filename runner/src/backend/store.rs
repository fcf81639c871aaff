use super::{Backend, BackendCallError, Operation, Outcome};
use crate::{
    config::StoreConfig,
    protocol::{SaveTarget, StoreCommand},
};
use duel_analysis::BackendId;
use reqwest::{blocking::Client, StatusCode};
use std::{path::PathBuf, time::Duration};
use tracing::{debug, info};

/// Adapter for the network store. Every command is one blocking GET on `<base_url>/<command>`.
#[derive(Debug)]
pub struct StoreBackend {
    client: Client,
    base_url: String,
    config: StoreConfig,
    columns: Vec<String>,
}

impl StoreBackend {
    pub fn connect(config: &StoreConfig) -> Result<Self, BackendCallError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        info!(url = %config.base_url, timeout_ms = config.timeout_ms, "Created store client");

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            config: config.clone(),
            columns: Vec::new(),
        })
    }

    pub fn url(&self, command: &StoreCommand) -> String {
        format!("{}/{}", self.base_url, command.to_wire())
    }

    fn call(&self, url: &str) -> Result<Outcome, BackendCallError> {
        let response = self.client.get(url).send()?;
        let status = response.status();

        // drain the body, the call is not over until the store finished answering
        response.bytes()?;

        if status == StatusCode::OK {
            Ok(Outcome::Acknowledged)
        } else {
            Err(BackendCallError::Status(status.as_u16()))
        }
    }

    pub fn send(&self, command: &StoreCommand) -> Result<Outcome, BackendCallError> {
        debug!(command = %command, "Sending store command");

        self.call(&self.url(command))
    }

    pub fn load(&self, name: &str) -> Result<(), BackendCallError> {
        self.send(&StoreCommand::Load {
            name: name.to_owned(),
        })?;

        info!(image = name, "Loaded store image");

        Ok(())
    }

    /// Ask the store for a flat text dump and return where it was written
    pub fn dump(&self) -> Result<PathBuf, BackendCallError> {
        self.send(&StoreCommand::Save {
            target: SaveTarget::Csv,
        })?;

        let path = self.config.dump_path();
        info!(path = %path.display(), "Store dumped its contents");

        Ok(path)
    }

    /// Persist a binary snapshot named after `scale`, used later by the file size comparison
    pub fn snapshot(&self, scale: usize) -> Result<PathBuf, BackendCallError> {
        self.send(&StoreCommand::Save {
            target: SaveTarget::File(self.config.snapshot_name(scale)),
        })?;

        let path = self.config.snapshot_path(scale);
        info!(path = %path.display(), "Store saved snapshot");

        Ok(path)
    }
}

impl Backend for StoreBackend {
    type Prepared = String;

    fn id(&self) -> BackendId {
        BackendId::Store
    }

    fn reset(&mut self, columns: &[String]) -> Result<(), BackendCallError> {
        self.columns = columns.to_vec();

        self.load(&self.config.empty_image)
    }

    fn prepare(&self, operation: Operation<'_>) -> String {
        let command = match operation {
            Operation::Insert(record) => StoreCommand::insert(record, &self.columns),
            Operation::PointQuery(key) => StoreCommand::PointQuery { key },
            Operation::RangeQuery { low, high } => StoreCommand::RangeQuery { low, high },
            Operation::Delete(key) => StoreCommand::Remove { key },
        };

        self.url(&command)
    }

    fn execute(&mut self, prepared: &String) -> Result<Outcome, BackendCallError> {
        self.call(prepared)
    }
}
