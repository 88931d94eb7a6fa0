//! Production and line storage.
//!
//! `ProductionStore` is the seam for an external persistence layer. The
//! broker only ships `InMemoryProductionStore`.

use crate::errors::IntercomError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{LineId, ProductionId};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// A named conference line within a production.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub id: LineId,
    pub name: String,
    /// Empty until the first conference is allocated for this line.
    pub bridge_conference_id: Option<String>,
    pub is_program_output: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Production {
    pub id: ProductionId,
    pub name: String,
    pub lines: Vec<Line>,
    pub created_at: DateTime<Utc>,
}

impl Production {
    pub fn line(&self, line_id: LineId) -> Option<&Line> {
        self.lines.iter().find(|l| l.id == line_id)
    }
}

/// Line parameters for creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLine {
    pub name: String,
    pub is_program_output: bool,
}

impl NewLine {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_program_output: false,
        }
    }
}

/// Production storage.
///
/// Not-found conditions are reported as `ProductionNotFound` / `LineNotFound`;
/// backend failures as `Store`.
#[async_trait]
pub trait ProductionStore: Send + Sync {
    async fn create_production(
        &self,
        name: String,
        lines: Vec<NewLine>,
    ) -> Result<Production, IntercomError>;

    async fn get_production(&self, id: ProductionId) -> Result<Production, IntercomError>;

    /// All productions, oldest first.
    async fn list_productions(&self) -> Result<Vec<Production>, IntercomError>;

    async fn delete_production(&self, id: ProductionId) -> Result<(), IntercomError>;

    async fn add_line(&self, id: ProductionId, line: NewLine) -> Result<Line, IntercomError>;

    async fn rename_line(
        &self,
        id: ProductionId,
        line_id: LineId,
        name: String,
    ) -> Result<Line, IntercomError>;

    async fn delete_line(&self, id: ProductionId, line_id: LineId) -> Result<(), IntercomError>;

    /// Record the bridge conference serving a line.
    async fn set_line_conference_id(
        &self,
        id: ProductionId,
        line_id: LineId,
        conference_id: String,
    ) -> Result<(), IntercomError>;
}

/// Process-local production store.
#[derive(Debug, Default)]
pub struct InMemoryProductionStore {
    productions: Mutex<Vec<Production>>,
}

impl InMemoryProductionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Production>> {
        self.productions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn production_mut(
    productions: &mut [Production],
    id: ProductionId,
) -> Result<&mut Production, IntercomError> {
    productions
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or_else(|| IntercomError::ProductionNotFound(id.to_string()))
}

fn line_mut(production: &mut Production, line_id: LineId) -> Result<&mut Line, IntercomError> {
    production
        .lines
        .iter_mut()
        .find(|l| l.id == line_id)
        .ok_or_else(|| IntercomError::LineNotFound(line_id.to_string()))
}

fn new_line(line: NewLine) -> Line {
    Line {
        id: LineId::new(),
        name: line.name,
        bridge_conference_id: None,
        is_program_output: line.is_program_output,
    }
}

#[async_trait]
impl ProductionStore for InMemoryProductionStore {
    async fn create_production(
        &self,
        name: String,
        lines: Vec<NewLine>,
    ) -> Result<Production, IntercomError> {
        let production = Production {
            id: ProductionId::new(),
            name,
            lines: lines.into_iter().map(new_line).collect(),
            created_at: Utc::now(),
        };
        self.lock().push(production.clone());
        debug!(target: "intercom.directory", production_id = %production.id, "Production created");
        Ok(production)
    }

    async fn get_production(&self, id: ProductionId) -> Result<Production, IntercomError> {
        self.lock()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| IntercomError::ProductionNotFound(id.to_string()))
    }

    async fn list_productions(&self) -> Result<Vec<Production>, IntercomError> {
        Ok(self.lock().clone())
    }

    async fn delete_production(&self, id: ProductionId) -> Result<(), IntercomError> {
        let mut productions = self.lock();
        let before = productions.len();
        productions.retain(|p| p.id != id);
        if productions.len() == before {
            return Err(IntercomError::ProductionNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn add_line(&self, id: ProductionId, line: NewLine) -> Result<Line, IntercomError> {
        let mut productions = self.lock();
        let production = production_mut(&mut productions, id)?;
        let line = new_line(line);
        production.lines.push(line.clone());
        Ok(line)
    }

    async fn rename_line(
        &self,
        id: ProductionId,
        line_id: LineId,
        name: String,
    ) -> Result<Line, IntercomError> {
        let mut productions = self.lock();
        let line = line_mut(production_mut(&mut productions, id)?, line_id)?;
        line.name = name;
        Ok(line.clone())
    }

    async fn delete_line(&self, id: ProductionId, line_id: LineId) -> Result<(), IntercomError> {
        let mut productions = self.lock();
        let production = production_mut(&mut productions, id)?;
        let before = production.lines.len();
        production.lines.retain(|l| l.id != line_id);
        if production.lines.len() == before {
            return Err(IntercomError::LineNotFound(line_id.to_string()));
        }
        Ok(())
    }

    async fn set_line_conference_id(
        &self,
        id: ProductionId,
        line_id: LineId,
        conference_id: String,
    ) -> Result<(), IntercomError> {
        let mut productions = self.lock();
        let line = line_mut(production_mut(&mut productions, id)?, line_id)?;
        line.bridge_conference_id = Some(conference_id);
        Ok(())
    }
}
