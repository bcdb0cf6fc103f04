use std::collections::BTreeMap;

use super::{ComponentPreparation, PreparationState, PreparationStateDeriver};
use crate::error::Result;
use crate::job::Component;

/// Builds a [`ComponentPreparation`] for every component of a job.
#[derive(Clone)]
pub struct ComponentPreparationFactory {
    deriver: PreparationStateDeriver,
}

impl ComponentPreparationFactory {
    pub fn new(deriver: PreparationStateDeriver) -> Self {
        Self { deriver }
    }

    /// One entry per component, in component order. Untouched components are
    /// reported as pending.
    pub fn create_all(&self, job_id: &str) -> Result<BTreeMap<Component, ComponentPreparation>> {
        let mut preparations = BTreeMap::new();
        for component in Component::ALL {
            preparations.insert(component, self.create(component, job_id)?);
        }
        Ok(preparations)
    }

    pub fn create(&self, component: Component, job_id: &str) -> Result<ComponentPreparation> {
        let (state, newest) = self.deriver.derive(component, job_id)?;
        let failure = match state {
            PreparationState::Failed => newest.and_then(|request| request.failure),
            _ => None,
        };
        Ok(ComponentPreparation::new(component, state).with_failure(failure))
    }
}
