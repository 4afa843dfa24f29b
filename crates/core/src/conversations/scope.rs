//! Scope resolution: turns a quote plus optional caller overrides into the
//! canonical (shipment, requester branch, provider branch) tuple and the
//! filter used to search for an existing thread.

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::organization::OrganizationId;
use crate::domain::quote::{QuoteContext, ShipmentId};
use crate::domain::thread::ThreadScope;

/// Caller intent for a single scope field. A field missing from a request is
/// `NotProvided`; an explicit `null` is `Clear`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ScopeField<T> {
    NotProvided,
    Clear,
    Set(T),
}

impl<T> Default for ScopeField<T> {
    fn default() -> Self {
        Self::NotProvided
    }
}

impl<T> ScopeField<T> {
    pub fn is_provided(&self) -> bool {
        !matches!(self, Self::NotProvided)
    }
}

impl<T> From<Option<T>> for ScopeField<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Set(value),
            None => Self::Clear,
        }
    }
}

// Only reached when the key is present; pair with `#[serde(default)]` so an
// absent key stays `NotProvided`.
impl<'de, T: Deserialize<'de>> Deserialize<'de> for ScopeField<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Self::from)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeOverrides {
    #[serde(default)]
    pub shipment_id: ScopeField<ShipmentId>,
    #[serde(default)]
    pub provider_branch_org_id: ScopeField<OrganizationId>,
    #[serde(default)]
    pub requester_branch_org_id: ScopeField<OrganizationId>,
}

impl ScopeOverrides {
    pub fn is_requested(&self) -> bool {
        self.shipment_id.is_provided()
            || self.provider_branch_org_id.is_provided()
            || self.requester_branch_org_id.is_provided()
    }
}

/// One column of a thread search. `Any` means "do not filter", which is not
/// the same as `Null` ("the column must be empty").
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldFilter<T> {
    Any,
    Null,
    Eq(T),
}

impl<T> Default for FieldFilter<T> {
    fn default() -> Self {
        Self::Any
    }
}

impl<T> FieldFilter<T> {
    pub fn map<U>(&self, f: impl FnOnce(&T) -> U) -> FieldFilter<U> {
        match self {
            Self::Any => FieldFilter::Any,
            Self::Null => FieldFilter::Null,
            Self::Eq(value) => FieldFilter::Eq(f(value)),
        }
    }
}

impl<T: PartialEq> FieldFilter<T> {
    /// Strict column match used by the scoped searches.
    pub fn matches(&self, column: Option<&T>) -> bool {
        match self {
            Self::Any => true,
            Self::Null => column.is_none(),
            Self::Eq(expected) => column == Some(expected),
        }
    }

    /// Lenient match for the legacy fallback: an empty column on the
    /// candidate behaves as a wildcard.
    pub fn tolerates(&self, column: Option<&T>) -> bool {
        match (self, column) {
            (Self::Any, _) | (_, None) => true,
            (Self::Null, Some(_)) => false,
            (Self::Eq(expected), Some(actual)) => expected == actual,
        }
    }

    fn from_field(field: &ScopeField<T>) -> Self
    where
        T: Clone,
    {
        match field {
            ScopeField::NotProvided => Self::Any,
            ScopeField::Clear => Self::Null,
            ScopeField::Set(value) => Self::Eq(value.clone()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScopeFilter {
    pub shipment_id: FieldFilter<ShipmentId>,
    pub requester_branch_org_id: FieldFilter<OrganizationId>,
    pub provider_branch_org_id: FieldFilter<OrganizationId>,
}

impl ScopeFilter {
    pub fn matches(&self, scope: &ThreadScope) -> bool {
        self.shipment_id.matches(scope.shipment_id.as_ref()) && self.matches_branches(scope)
    }

    /// Branch columns only; the shipment or quote key is matched by the caller.
    pub fn matches_branches(&self, scope: &ThreadScope) -> bool {
        self.requester_branch_org_id.matches(scope.requester_branch_org_id.as_ref())
            && self.provider_branch_org_id.matches(scope.provider_branch_org_id.as_ref())
    }

    /// Whether a thread found by the unconditional quote fallback may serve a
    /// scoped request.
    pub fn accepts_fallback(&self, scope: &ThreadScope) -> bool {
        self.shipment_id.tolerates(scope.shipment_id.as_ref())
            && self.requester_branch_org_id.tolerates(scope.requester_branch_org_id.as_ref())
            && self.provider_branch_org_id.tolerates(scope.provider_branch_org_id.as_ref())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedScope {
    pub scope: ThreadScope,
    pub scoped: bool,
    pub filter: ScopeFilter,
}

impl ResolvedScope {
    /// Scope columns a newly created thread should carry. Unscoped threads
    /// keep every column empty.
    pub fn persisted_scope(&self) -> ThreadScope {
        if self.scoped {
            self.scope.clone()
        } else {
            ThreadScope::default()
        }
    }

    /// Scope an existing thread should carry after serving this request.
    /// Columns the caller did not filter on keep the thread's value and are
    /// only filled when still empty.
    pub fn promoted_scope(&self, current: &ThreadScope) -> ThreadScope {
        if !self.scoped {
            return current.clone();
        }
        ThreadScope {
            shipment_id: promote(
                &self.filter.shipment_id,
                &current.shipment_id,
                &self.scope.shipment_id,
            ),
            requester_branch_org_id: promote(
                &self.filter.requester_branch_org_id,
                &current.requester_branch_org_id,
                &self.scope.requester_branch_org_id,
            ),
            provider_branch_org_id: promote(
                &self.filter.provider_branch_org_id,
                &current.provider_branch_org_id,
                &self.scope.provider_branch_org_id,
            ),
        }
    }
}

fn promote<T: Clone>(filter: &FieldFilter<T>, current: &Option<T>, resolved: &Option<T>) -> Option<T> {
    match filter {
        FieldFilter::Any => current.clone().or_else(|| resolved.clone()),
        FieldFilter::Null | FieldFilter::Eq(_) => resolved.clone(),
    }
}

pub fn resolve_scope(quote: &QuoteContext, overrides: &ScopeOverrides) -> ResolvedScope {
    let requested = overrides.is_requested();

    let shipment_id = match &overrides.shipment_id {
        ScopeField::Set(id) => Some(id.clone()),
        ScopeField::Clear => None,
        ScopeField::NotProvided => quote.shipment_id.clone(),
    };
    let requester_branch_org_id = match &overrides.requester_branch_org_id {
        ScopeField::Set(id) => Some(id.clone()),
        ScopeField::Clear => None,
        ScopeField::NotProvided if requested => Some(quote.owner_org_id.clone()),
        ScopeField::NotProvided => None,
    };
    let provider_branch_org_id = match &overrides.provider_branch_org_id {
        ScopeField::Set(id) => Some(id.clone()),
        ScopeField::Clear | ScopeField::NotProvided => None,
    };

    let scope = ThreadScope { shipment_id, requester_branch_org_id, provider_branch_org_id };
    let scoped = requested && !scope.is_empty();

    let requester_filter = match &overrides.requester_branch_org_id {
        ScopeField::NotProvided if requested => FieldFilter::Eq(quote.owner_org_id.clone()),
        field => FieldFilter::from_field(field),
    };
    let filter = ScopeFilter {
        shipment_id: FieldFilter::from_field(&overrides.shipment_id),
        requester_branch_org_id: requester_filter,
        provider_branch_org_id: FieldFilter::from_field(&overrides.provider_branch_org_id),
    };

    ResolvedScope { scope, scoped, filter }
}
