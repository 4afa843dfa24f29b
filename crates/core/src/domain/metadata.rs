//! Structured form of the document stored in a thread's `metadata_json`
//! column and mirrored into the provider conversation's attributes.
//!
//! Keys this crate does not know about are carried in `extra` so that a
//! decode/encode cycle never drops fields written by other consumers.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::organization::OrganizationId;
use crate::domain::participant::ParticipantRole;
use crate::domain::quote::{QuoteContext, QuoteId, ShipmentId};
use crate::domain::thread::ThreadScope;
use crate::domain::user::UserId;

const ROSTER_KEY: &str = "participants";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    pub id: UserId,
    pub identity: String,
    pub role: ParticipantRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<OrganizationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_label: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ParticipantSummary {
    /// Shallow merge: fields present on `update` win, absent ones keep the
    /// previous value.
    pub fn merge_from(&mut self, update: ParticipantSummary) {
        self.identity = update.identity;
        self.role = update.role;
        merge_field(&mut self.display_name, update.display_name);
        merge_field(&mut self.organization_id, update.organization_id);
        merge_field(&mut self.organization_name, update.organization_name);
        merge_field(&mut self.organization_logo_url, update.organization_logo_url);
        merge_field(&mut self.location_label, update.location_label);
        self.extra.extend(update.extra);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThreadMetadata {
    pub participants: Vec<ParticipantSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<QuoteId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<OrganizationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment_id: Option<ShipmentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester_branch_org_id: Option<OrganizationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_branch_org_id: Option<OrganizationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner_company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipper_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipper_company: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ThreadMetadata {
    /// Decodes a stored document. Anything that is not a JSON object is
    /// treated as empty. Each known key is decoded on its own: a value of the
    /// wrong type stays in `extra` under its original key, and roster entries
    /// that fail to decode are dropped individually.
    pub fn from_json(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self::default();
        };

        let participants = match map.remove(ROSTER_KEY) {
            Some(Value::Array(entries)) => entries
                .into_iter()
                .filter_map(|entry| serde_json::from_value(entry).ok())
                .collect(),
            _ => Vec::new(),
        };

        Self {
            participants,
            quote_id: take_known(&mut map, "quoteId"),
            organization_id: take_known(&mut map, "organizationId"),
            shipment_id: take_known(&mut map, "shipmentId"),
            requester_branch_org_id: take_known(&mut map, "requesterBranchOrgId"),
            provider_branch_org_id: take_known(&mut map, "providerBranchOrgId"),
            quote_title: take_known(&mut map, "quoteTitle"),
            shipment_reference: take_known(&mut map, "shipmentReference"),
            partner_name: take_known(&mut map, "partnerName"),
            partner_company: take_known(&mut map, "partnerCompany"),
            shipper_name: take_known(&mut map, "shipperName"),
            shipper_company: take_known(&mut map, "shipperCompany"),
            extra: map,
        }
    }

    pub fn from_json_str(raw: &str) -> Self {
        serde_json::from_str::<Value>(raw).map(Self::from_json).unwrap_or_default()
    }

    /// Encodes the document. A typed field that now holds a value replaces
    /// any undecodable raw value kept in `extra` under the same key.
    pub fn to_json(&self) -> Value {
        let populated = self.populated_keys();
        let mut document = self.clone();
        document.extra.retain(|key, _| !populated.contains(&key.as_str()));
        serde_json::to_value(document).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    fn populated_keys(&self) -> Vec<&'static str> {
        [
            ("quoteId", self.quote_id.is_some()),
            ("organizationId", self.organization_id.is_some()),
            ("shipmentId", self.shipment_id.is_some()),
            ("requesterBranchOrgId", self.requester_branch_org_id.is_some()),
            ("providerBranchOrgId", self.provider_branch_org_id.is_some()),
            ("quoteTitle", self.quote_title.is_some()),
            ("shipmentReference", self.shipment_reference.is_some()),
            ("partnerName", self.partner_name.is_some()),
            ("partnerCompany", self.partner_company.is_some()),
            ("shipperName", self.shipper_name.is_some()),
            ("shipperCompany", self.shipper_company.is_some()),
        ]
        .into_iter()
        .filter_map(|(key, set)| set.then_some(key))
        .collect()
    }

    pub fn apply_scope(&mut self, scope: &ThreadScope) {
        self.shipment_id = scope.shipment_id.clone();
        self.requester_branch_org_id = scope.requester_branch_org_id.clone();
        self.provider_branch_org_id = scope.provider_branch_org_id.clone();
    }

    /// Fills quote-derived convenience fields that are still unset.
    pub fn apply_quote(&mut self, quote: &QuoteContext) {
        if self.quote_id.is_none() {
            self.quote_id = Some(quote.id.clone());
        }
        if self.organization_id.is_none() {
            self.organization_id = Some(quote.owner_org_id.clone());
        }
        if self.quote_title.is_none() {
            self.quote_title = quote.title.clone();
        }
        if self.shipment_reference.is_none() {
            self.shipment_reference = quote.shipment_reference.clone();
        }
    }

    pub fn roster_entry(&self, user_id: &UserId) -> Option<&ParticipantSummary> {
        self.participants.iter().find(|entry| &entry.id == user_id)
    }

    pub fn upsert_participant(&mut self, summary: ParticipantSummary) {
        match self.participants.iter_mut().find(|entry| entry.id == summary.id) {
            Some(existing) => existing.merge_from(summary),
            None => self.participants.push(summary),
        }
    }

    /// Establishes the primary display identity for a role. Only the first
    /// participant synchronized for a role sets it.
    pub fn claim_role_display(&mut self, summary: &ParticipantSummary) {
        let (name, company) = match summary.role {
            ParticipantRole::Requester => (&mut self.partner_name, &mut self.partner_company),
            ParticipantRole::Provider => (&mut self.shipper_name, &mut self.shipper_company),
        };
        if name.is_some() || company.is_some() {
            return;
        }
        *name = summary.display_name.clone();
        *company = summary.organization_name.clone();
    }
}

/// Removes `key` and decodes it. Undecodable values go back into `map`.
fn take_known<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Option<T> {
    let value = map.remove(key)?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(decoded) => Some(decoded),
        Err(_) => {
            map.insert(key.to_string(), value);
            None
        }
    }
}

fn merge_field<T>(target: &mut Option<T>, update: Option<T>) {
    if update.is_some() {
        *target = update;
    }
}
