//! In-memory remote API.
//!
//! [`FakeGateway`] behaves like the remote policy-management API as far as
//! the reconciliation core can tell: it assigns sequential IDs (`id1`,
//! `id2`, ...), refuses duplicate names with a Conflict, and reports missing
//! objects as NotFound. Every call is logged, and faults can be injected per
//! call kind and target.

use std::sync::{Mutex, MutexGuard};

use policy_core::{
    Attributes, CallContext, CancelHandle, DeclaredEntity, Gateway, GatewayError, GatewayResult,
    PlacementDirective, RemoteId, RemoteObject,
};
use serde_json::Value;

/// The kind of a gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Create,
    Get,
    Update,
    Delete,
    FindByName,
    CreateMany,
}

/// One logged gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `query` is the placement query string, empty when none was sent.
    Create { name: String, query: String },
    Get { id: RemoteId },
    Update { id: RemoteId, name: String },
    Delete { id: RemoteId },
    FindByName { name: String },
    CreateMany { names: Vec<String> },
}

impl Call {
    pub fn kind(&self) -> CallKind {
        match self {
            Call::Create { .. } => CallKind::Create,
            Call::Get { .. } => CallKind::Get,
            Call::Update { .. } => CallKind::Update,
            Call::Delete { .. } => CallKind::Delete,
            Call::FindByName { .. } => CallKind::FindByName,
            Call::CreateMany { .. } => CallKind::CreateMany,
        }
    }

    /// True for calls that change remote state.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Call::Get { .. } | Call::FindByName { .. })
    }
}

#[derive(Debug)]
struct Fault {
    kind: CallKind,
    /// Entity name or remote ID; `None` matches every target.
    target: Option<String>,
    error: GatewayError,
    /// `None` fires forever.
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    objects: Vec<RemoteObject>,
    calls: Vec<Call>,
    faults: Vec<Fault>,
    bulk_outcome_limit: Option<usize>,
    cancel_after: Option<(usize, CancelHandle)>,
}

impl State {
    fn log(&mut self, call: Call) {
        self.calls.push(call);
        if let Some((limit, handle)) = &self.cancel_after
            && self.calls.len() >= *limit
        {
            handle.cancel();
        }
    }

    fn fault(&mut self, kind: CallKind, targets: &[&str]) -> Option<GatewayError> {
        let index = self.faults.iter().position(|f| {
            f.kind == kind
                && f.target
                    .as_deref()
                    .is_none_or(|t| targets.contains(&t))
        })?;

        let fault = &mut self.faults[index];
        let error = fault.error.clone();
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                self.faults.remove(index);
            }
        }
        Some(error)
    }

    fn name_of(&self, id: &RemoteId) -> Option<String> {
        self.objects
            .iter()
            .find(|o| &o.id == id)
            .map(|o| o.name.clone())
    }

    fn insert(&mut self, entity: &DeclaredEntity) -> GatewayResult<RemoteId> {
        if let Some(error) = self.fault(CallKind::Create, &[entity.name()]) {
            return Err(error);
        }
        if self.objects.iter().any(|o| o.name == entity.name()) {
            return Err(GatewayError::conflict(format!(
                "an object named '{}' already exists",
                entity.name()
            )));
        }
        let id = self.allocate();
        self.objects.push(RemoteObject {
            id: id.clone(),
            name: entity.name().to_string(),
            kind: Some(entity.kind().wire_type().to_string()),
            attributes: entity.attributes().clone(),
        });
        Ok(id)
    }

    fn allocate(&mut self) -> RemoteId {
        self.next_id += 1;
        RemoteId::new(format!("id{}", self.next_id))
    }
}

/// In-memory gateway with a call log and fault injection.
#[derive(Debug, Default)]
pub struct FakeGateway {
    state: Mutex<State>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Puts an object on the remote side without logging a call, as if
    /// created out of band or by an earlier, unrecorded pass. Duplicate
    /// names are allowed here.
    pub fn seed(&self, name: &str, attributes: Value) -> RemoteId {
        let attributes: Attributes = serde_json::from_value(attributes)
            .unwrap_or_else(|e| panic!("seed: expected a JSON object: {e}"));
        let mut state = self.state();
        let id = state.allocate();
        state.objects.push(RemoteObject {
            id: id.clone(),
            name: name.to_string(),
            kind: None,
            attributes,
        });
        id
    }

    /// Deletes an object out of band.
    pub fn remove_remote(&self, id: &RemoteId) -> bool {
        let mut state = self.state();
        let before = state.objects.len();
        state.objects.retain(|o| &o.id != id);
        state.objects.len() != before
    }

    /// Fails every `kind` call on `target` (entity name or remote ID).
    pub fn fail(&self, kind: CallKind, target: &str, error: GatewayError) {
        self.push_fault(kind, Some(target), error, None);
    }

    /// Fails the next `kind` call on `target` only.
    pub fn fail_once(&self, kind: CallKind, target: &str, error: GatewayError) {
        self.push_fault(kind, Some(target), error, Some(1));
    }

    /// Fails every `kind` call regardless of target.
    pub fn fail_all(&self, kind: CallKind, error: GatewayError) {
        self.push_fault(kind, None, error, None);
    }

    fn push_fault(
        &self,
        kind: CallKind,
        target: Option<&str>,
        error: GatewayError,
        remaining: Option<usize>,
    ) {
        self.state().faults.push(Fault {
            kind,
            target: target.map(str::to_string),
            error,
            remaining,
        });
    }

    /// Removes every injected fault.
    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    /// Makes `create_many` return at most `limit` outcomes (the objects
    /// beyond the limit are still not created).
    pub fn limit_bulk_outcomes(&self, limit: usize) {
        self.state().bulk_outcome_limit = Some(limit);
    }

    /// Cancels `handle` once `calls` calls have been logged.
    pub fn cancel_after(&self, calls: usize, handle: CancelHandle) {
        self.state().cancel_after = Some((calls, handle));
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Number of calls of `kind`.
    pub fn count(&self, kind: CallKind) -> usize {
        self.state().calls.iter().filter(|c| c.kind() == kind).count()
    }

    /// Number of calls that change remote state.
    pub fn mutation_count(&self) -> usize {
        self.state().calls.iter().filter(|c| c.is_mutation()).count()
    }

    /// Remote objects, in creation order.
    pub fn objects(&self) -> Vec<RemoteObject> {
        self.state().objects.clone()
    }

    pub fn object(&self, id: &RemoteId) -> Option<RemoteObject> {
        self.state().objects.iter().find(|o| &o.id == id).cloned()
    }

    pub fn object_by_name(&self, name: &str) -> Option<RemoteObject> {
        self.state().objects.iter().find(|o| o.name == name).cloned()
    }
}

impl Gateway for FakeGateway {
    fn create(
        &self,
        _ctx: &CallContext,
        entity: &DeclaredEntity,
        directive: Option<&PlacementDirective>,
    ) -> GatewayResult<RemoteId> {
        let mut state = self.state();
        state.log(Call::Create {
            name: entity.name().to_string(),
            query: directive.map(|d| d.query_string()).unwrap_or_default(),
        });
        state.insert(entity)
    }

    fn get(&self, _ctx: &CallContext, id: &RemoteId) -> GatewayResult<RemoteObject> {
        let mut state = self.state();
        state.log(Call::Get { id: id.clone() });
        let name = state.name_of(id).unwrap_or_default();
        if let Some(error) = state.fault(CallKind::Get, &[id.as_str(), name.as_str()]) {
            return Err(error);
        }
        state
            .objects
            .iter()
            .find(|o| &o.id == id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found(format!("no object {id}")))
    }

    fn update(
        &self,
        _ctx: &CallContext,
        id: &RemoteId,
        entity: &DeclaredEntity,
    ) -> GatewayResult<()> {
        let mut state = self.state();
        state.log(Call::Update {
            id: id.clone(),
            name: entity.name().to_string(),
        });
        if let Some(error) = state.fault(CallKind::Update, &[id.as_str(), entity.name()]) {
            return Err(error);
        }
        let object = state
            .objects
            .iter_mut()
            .find(|o| &o.id == id)
            .ok_or_else(|| GatewayError::not_found(format!("no object {id}")))?;
        object.name = entity.name().to_string();
        object.attributes = entity.attributes().clone();
        Ok(())
    }

    fn delete(&self, _ctx: &CallContext, id: &RemoteId) -> GatewayResult<()> {
        let mut state = self.state();
        state.log(Call::Delete { id: id.clone() });
        let name = state.name_of(id).unwrap_or_default();
        if let Some(error) = state.fault(CallKind::Delete, &[id.as_str(), name.as_str()]) {
            return Err(error);
        }
        let before = state.objects.len();
        state.objects.retain(|o| &o.id != id);
        if state.objects.len() == before {
            return Err(GatewayError::not_found(format!("no object {id}")));
        }
        Ok(())
    }

    fn find_by_name(&self, _ctx: &CallContext, name: &str) -> GatewayResult<Vec<RemoteObject>> {
        let mut state = self.state();
        state.log(Call::FindByName {
            name: name.to_string(),
        });
        if let Some(error) = state.fault(CallKind::FindByName, &[name]) {
            return Err(error);
        }
        Ok(state
            .objects
            .iter()
            .filter(|o| o.name == name)
            .cloned()
            .collect())
    }

    fn create_many(
        &self,
        _ctx: &CallContext,
        entities: &[DeclaredEntity],
    ) -> GatewayResult<Vec<GatewayResult<RemoteId>>> {
        let mut state = self.state();
        state.log(Call::CreateMany {
            names: entities.iter().map(|e| e.name().to_string()).collect(),
        });
        let names: Vec<&str> = entities.iter().map(|e| e.name()).collect();
        if let Some(error) = state.fault(CallKind::CreateMany, &names) {
            return Err(error);
        }

        let limit = state.bulk_outcome_limit.unwrap_or(entities.len());
        Ok(entities
            .iter()
            .take(limit)
            .map(|entity| state.insert(entity))
            .collect())
    }
}
