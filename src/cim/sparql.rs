//! Equipment and measurement lookup against the Blazegraph SPARQL endpoint.

use std::collections::HashMap;

use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, warn};

use super::ModelError;
use super::model::{DeviceClass, Equipment, MeasurementPoint};

/// CIM namespace of the `rc4_2021` profile.
pub const CIM_NAMESPACE: &str = "http://iec.ch/TC57/CIM100#";

const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// SPARQL 1.1 JSON result set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SparqlResults {
    pub results: Bindings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Bindings {
    pub bindings: Vec<HashMap<String, BindingValue>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BindingValue {
    pub value: String,
}

/// Query client for the model database.
#[derive(Debug, Clone)]
pub struct BlazegraphClient {
    http: reqwest::Client,
    url: String,
}

impl BlazegraphClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Runs a SELECT query and decodes the JSON result set.
    pub async fn select(&self, query: &str) -> Result<SparqlResults, ModelError> {
        let response = self
            .http
            .post(&self.url)
            .header(ACCEPT, SPARQL_RESULTS_JSON)
            .form(&[("query", query)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::SparqlStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<SparqlResults>().await?)
    }

    /// Loads loads, DER inverters, and switches of one feeder together with
    /// their analog measurements.
    pub async fn feeder_equipment(&self, feeder_mrid: &str) -> Result<Vec<Equipment>, ModelError> {
        let results = self.select(&feeder_equipment_query(feeder_mrid)).await?;
        let equipment = equipment_from_bindings(&results);
        debug!(
            feeder = feeder_mrid,
            rows = results.results.bindings.len(),
            equipment = equipment.len(),
            "loaded feeder equipment"
        );
        Ok(equipment)
    }
}

/// SELECT over the feeder's equipment of every [`DeviceClass`], with
/// optional analog measurements.
pub fn feeder_equipment_query(feeder_mrid: &str) -> String {
    let classes = DeviceClass::ALL
        .iter()
        .map(|c| format!("c:{}", c.cim_name()))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        r#"PREFIX r: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>
PREFIX c: <{CIM_NAMESPACE}>
SELECT ?eqclass ?eqid ?eqname ?measid ?measname ?meastype ?phases WHERE {{
  VALUES ?fdrid {{"{feeder_mrid}"}}
  ?fdr c:IdentifiedObject.mRID ?fdrid.
  ?eq c:Equipment.EquipmentContainer ?fdr.
  ?eq r:type ?eqtype.
  VALUES ?eqtype {{{classes}}}
  ?eq c:IdentifiedObject.mRID ?eqid.
  OPTIONAL {{ ?eq c:IdentifiedObject.name ?eqname. }}
  OPTIONAL {{
    ?meas c:Measurement.PowerSystemResource ?eq.
    ?meas r:type c:Analog.
    ?meas c:IdentifiedObject.mRID ?measid.
    ?meas c:IdentifiedObject.name ?measname.
    ?meas c:Measurement.measurementType ?meastype.
    ?meas c:Measurement.phases ?phsraw.
    BIND(STRAFTER(STR(?phsraw), "PhaseCode.") AS ?phases)
  }}
  BIND(STRAFTER(STR(?eqtype), "CIM100#") AS ?eqclass)
}}
ORDER BY ?eqclass ?eqname ?meastype ?phases"#
    )
}

/// Groups result rows into equipment, first occurrence first.
///
/// Rows of unknown classes are skipped; repeated measurement rows are
/// collapsed by measurement mRID.
pub fn equipment_from_bindings(results: &SparqlResults) -> Vec<Equipment> {
    let mut order: Vec<String> = Vec::new();
    let mut by_mrid: HashMap<String, Equipment> = HashMap::new();

    for row in &results.results.bindings {
        let get = |name: &str| row.get(name).map(|b| b.value.as_str());
        let (Some(class_name), Some(mrid)) = (get("eqclass"), get("eqid")) else {
            continue;
        };
        let Some(class) = DeviceClass::from_cim_name(class_name) else {
            warn!(class = class_name, mrid, "skipping equipment of unexpected class");
            continue;
        };

        let equipment = by_mrid.entry(mrid.to_string()).or_insert_with(|| {
            order.push(mrid.to_string());
            Equipment {
                mrid: mrid.to_string(),
                name: get("eqname").unwrap_or_default().to_string(),
                class,
                measurements: Vec::new(),
            }
        });

        if let Some(meas_mrid) = get("measid") {
            if equipment.measurements.iter().any(|m| m.mrid == meas_mrid) {
                continue;
            }
            equipment.measurements.push(MeasurementPoint {
                mrid: meas_mrid.to_string(),
                name: get("measname").unwrap_or_default().to_string(),
                measurement_type: get("meastype").unwrap_or_default().to_string(),
                phases: get("phases").unwrap_or_default().to_string(),
            });
        }
    }

    order
        .into_iter()
        .filter_map(|mrid| by_mrid.remove(&mrid))
        .collect()
}
