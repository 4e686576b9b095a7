//! Attribute read/write gateway.
//!
//! All checks that can be made locally (component exists, name refers to a
//! vigilant attribute, text converts to the attribute's shape) run before the
//! write is issued, so a rejected request never reaches the hardware.

use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{AttributeInfo, Component, RemoteObject, VigilantAttribute};
use crate::coerce::coerce;
use crate::error::{CliError, CliResult, ObjectKind};
use crate::resolve::resolve_component;
use crate::session::Session;
use crate::value::Value;

/// Read-only attributes that describe the graph itself and are shown elsewhere.
const STRUCTURAL_ATTRIBUTES: &[&str] = &[
    "name",
    "role",
    "parent",
    "children",
    "affects",
    "actuators",
    "detectors",
    "emitters",
];

/// One `component.attribute=value` request.
#[derive(Debug, Clone, PartialEq)]
pub struct SetAttrRequest {
    pub component: String,
    pub attribute: String,
    pub value: String,
}

impl SetAttrRequest {
    pub fn new(
        component: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

/// Fetch the vigilant attribute `attr` of `component`.
pub async fn fetch_attribute(
    component: &Component,
    attr: &str,
) -> CliResult<Arc<dyn VigilantAttribute>> {
    let object = component
        .lookup(attr)
        .await
        .map_err(|e| CliError::from_remote(component.name(), e))?;
    match object {
        None => Err(CliError::not_found(ObjectKind::Attribute, attr)),
        Some(RemoteObject::Attribute(va)) => Ok(va),
        Some(_) => Err(CliError::NotAttribute {
            component: component.name().to_string(),
            attribute: attr.to_string(),
        }),
    }
}

/// Convert `text` to the type of `component.attr` and write it.
pub async fn set_attribute(
    session: &Session,
    component: &str,
    attr: &str,
    text: &str,
) -> CliResult<()> {
    let comp = resolve_component(session, component).await?;
    let va = fetch_attribute(&comp, attr).await?;

    let target = format!("{}.{}", component, attr);
    let current = va
        .value()
        .await
        .map_err(|e| CliError::from_remote(target.as_str(), e))?;
    let new_value = coerce(&current, text)?;
    debug!("Writing {} = {}", target, new_value);

    va.set_value(new_value)
        .await
        .map_err(|e| CliError::from_remote(target.as_str(), e))?;
    info!("Set {} to '{}'", target, text);
    Ok(())
}

/// Apply the requests in order, stopping at the first failure.
pub async fn set_attributes(session: &Session, requests: &[SetAttrRequest]) -> CliResult<()> {
    for req in requests {
        set_attribute(session, &req.component, &req.attribute, &req.value).await?;
    }
    Ok(())
}

/// A vigilant attribute as shown by the property listing.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeEntry {
    pub name: String,
    pub value: Value,
    pub info: AttributeInfo,
}

/// Everything a component exposes, as fetched at one moment.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyListing {
    pub name: String,
    pub role: String,
    pub affects: Vec<String>,
    pub ro_attributes: Vec<(String, Value)>,
    pub attributes: Vec<AttributeEntry>,
    pub data_flows: Vec<String>,
}

/// Gather the properties of any component.
pub async fn list_properties(session: &Session, component: &str) -> CliResult<PropertyListing> {
    let comp = resolve_component(session, component).await?;
    let remote = |e| CliError::from_remote(component, e);

    let affects = comp.affects().await.map_err(remote)?;
    let ro_attributes = comp
        .ro_attributes()
        .await
        .map_err(remote)?
        .into_iter()
        .filter(|(name, _)| !STRUCTURAL_ATTRIBUTES.contains(&name.as_str()))
        .collect();

    let mut attributes = Vec::new();
    for (name, va) in comp.vigilant_attributes().await.map_err(remote)? {
        let value = va.value().await.map_err(remote)?;
        let info = va.info().await.map_err(remote)?;
        attributes.push(AttributeEntry { name, value, info });
    }

    let data_flows = comp
        .data_flows()
        .await
        .map_err(remote)?
        .into_iter()
        .map(|(name, _)| name)
        .collect();

    Ok(PropertyListing {
        name: comp.name().to_string(),
        role: comp.role().to_string(),
        affects,
        ro_attributes,
        attributes,
        data_flows,
    })
}
