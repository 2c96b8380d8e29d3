//! Feeder model partitioned into switch areas.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ModelError;
use super::topology::{FeederTopology, SwitchAreaTopology};

/// Equipment classes the application reads from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceClass {
    EnergyConsumer,
    PowerElectronicsConnection,
    LoadBreakSwitch,
    Breaker,
    Recloser,
    Fuse,
    Sectionaliser,
    Disconnector,
}

impl DeviceClass {
    /// Every class requested from the model database.
    pub const ALL: [DeviceClass; 8] = [
        DeviceClass::EnergyConsumer,
        DeviceClass::PowerElectronicsConnection,
        DeviceClass::LoadBreakSwitch,
        DeviceClass::Breaker,
        DeviceClass::Recloser,
        DeviceClass::Fuse,
        DeviceClass::Sectionaliser,
        DeviceClass::Disconnector,
    ];

    /// CIM class name (local part of the `rdf:type` IRI).
    pub fn cim_name(self) -> &'static str {
        match self {
            DeviceClass::EnergyConsumer => "EnergyConsumer",
            DeviceClass::PowerElectronicsConnection => "PowerElectronicsConnection",
            DeviceClass::LoadBreakSwitch => "LoadBreakSwitch",
            DeviceClass::Breaker => "Breaker",
            DeviceClass::Recloser => "Recloser",
            DeviceClass::Fuse => "Fuse",
            DeviceClass::Sectionaliser => "Sectionaliser",
            DeviceClass::Disconnector => "Disconnector",
        }
    }

    pub fn from_cim_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.cim_name() == name)
    }

    pub fn is_switch(self) -> bool {
        !matches!(
            self,
            DeviceClass::EnergyConsumer | DeviceClass::PowerElectronicsConnection
        )
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cim_name())
    }
}

/// An analog measurement attached to a piece of equipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementPoint {
    pub mrid: String,
    pub name: String,
    /// `VA`, `PNV`, `A`, `Pos`, ...
    pub measurement_type: String,
    /// Phase code without the `PhaseCode.` prefix.
    pub phases: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub mrid: String,
    pub name: String,
    pub class: DeviceClass,
    #[serde(default)]
    pub measurements: Vec<MeasurementPoint>,
}

/// Switch on the boundary of a switch area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundarySwitch {
    pub mrid: String,
    pub name: String,
}

/// Equipment grouped by class, then by mRID.
pub type TypedCatalog = BTreeMap<DeviceClass, BTreeMap<String, Equipment>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecondaryArea {
    #[serde(default)]
    pub distribution_transformers: Vec<String>,
    #[serde(default)]
    pub typed_catalog: TypedCatalog,
}

/// A feeder section bounded by switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwitchArea {
    pub boundary_switches: Vec<BoundarySwitch>,
    #[serde(default)]
    pub typed_catalog: TypedCatalog,
    #[serde(default)]
    pub secondary_areas: Vec<SecondaryArea>,
}

impl SwitchArea {
    /// First boundary switch; its name labels the area's output column.
    pub fn parent_switch(&self) -> Option<&BoundarySwitch> {
        self.boundary_switches.first()
    }

    pub fn contains_class(&self, class: DeviceClass) -> bool {
        self.typed_catalog.contains_key(&class)
    }

    pub fn equipment(&self, class: DeviceClass) -> impl Iterator<Item = &Equipment> {
        self.typed_catalog
            .get(&class)
            .into_iter()
            .flat_map(|by_mrid| by_mrid.values())
    }

    pub fn insert(&mut self, equipment: Equipment) {
        insert_into(&mut self.typed_catalog, equipment);
    }

    pub fn equipment_count(&self) -> usize {
        self.typed_catalog.values().map(BTreeMap::len).sum()
    }
}

fn insert_into(catalog: &mut TypedCatalog, equipment: Equipment) {
    catalog
        .entry(equipment.class)
        .or_default()
        .insert(equipment.mrid.clone(), equipment);
}

/// Feeder model with its switch-area partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedModel {
    pub feeder_mrid: String,
    pub feeder_name: String,
    pub switch_areas: Vec<SwitchArea>,
}

impl DistributedModel {
    /// Partitions `equipment` into the switch areas of `topology`.
    ///
    /// Equipment belongs to an area when its mRID is listed among the
    /// area's addressable or unaddressable equipment. Secondary-area
    /// equipment is folded into the parent area when `include_secondary`
    /// is set and kept in its own secondary area otherwise.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::NoBoundarySwitch` if an area lists no boundary
    /// switch.
    pub fn assemble(
        feeder_mrid: &str,
        feeder_name: &str,
        topology: &FeederTopology,
        equipment: Vec<Equipment>,
        include_secondary: bool,
    ) -> Result<Self, ModelError> {
        let index: HashMap<String, Equipment> = equipment
            .into_iter()
            .map(|eq| (eq.mrid.clone(), eq))
            .collect();

        let mut switch_areas = Vec::with_capacity(topology.switch_areas.len());
        for (area_index, area_topology) in topology.switch_areas.iter().enumerate() {
            let area = build_area(area_index, area_topology, &index, include_secondary)?;
            debug!(
                area = area_index,
                switch = area.parent_switch().map(|s| s.name.as_str()),
                equipment = area.equipment_count(),
                "assembled switch area"
            );
            switch_areas.push(area);
        }

        info!(
            feeder = feeder_name,
            areas = switch_areas.len(),
            "feeder model assembled"
        );

        Ok(Self {
            feeder_mrid: feeder_mrid.to_string(),
            feeder_name: feeder_name.to_string(),
            switch_areas,
        })
    }

    /// Output column name of every area, in area order.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::NoBoundarySwitch` for the first area without one.
    pub fn section_names(&self) -> Result<Vec<String>, ModelError> {
        self.switch_areas
            .iter()
            .enumerate()
            .map(|(area, sa)| {
                sa.parent_switch()
                    .map(|s| s.name.clone())
                    .ok_or(ModelError::NoBoundarySwitch { area })
            })
            .collect()
    }

    /// Reads a model previously written by [`DistributedModel::save_snapshot`].
    pub fn load_snapshot(path: &Path) -> Result<Self, ModelError> {
        let file = File::open(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model: Self = serde_json::from_reader(BufReader::new(file))?;
        model.section_names()?;
        Ok(model)
    }

    /// Writes the model as pretty-printed JSON.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), ModelError> {
        let io_err = |source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush().map_err(io_err)
    }
}

fn build_area(
    area_index: usize,
    topology: &SwitchAreaTopology,
    index: &HashMap<String, Equipment>,
    include_secondary: bool,
) -> Result<SwitchArea, ModelError> {
    if topology.boundary_switches.is_empty() {
        return Err(ModelError::NoBoundarySwitch { area: area_index });
    }

    let boundary_switches = topology
        .boundary_switches
        .iter()
        .map(|mrid| BoundarySwitch {
            mrid: mrid.clone(),
            name: index
                .get(mrid)
                .map(|eq| eq.name.clone())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| mrid.clone()),
        })
        .collect();

    let mut area = SwitchArea {
        boundary_switches,
        ..SwitchArea::default()
    };

    for mrid in members(&topology.addressable_equipment, &topology.unaddressable_equipment) {
        if let Some(eq) = index.get(mrid) {
            area.insert(eq.clone());
        }
    }

    for secondary in &topology.secondary_areas {
        let mut catalog = TypedCatalog::new();
        for mrid in members(
            &secondary.addressable_equipment,
            &secondary.unaddressable_equipment,
        ) {
            if let Some(eq) = index.get(mrid) {
                if include_secondary {
                    area.insert(eq.clone());
                } else {
                    insert_into(&mut catalog, eq.clone());
                }
            }
        }
        area.secondary_areas.push(SecondaryArea {
            distribution_transformers: secondary.distribution_transformer.clone(),
            typed_catalog: catalog,
        });
    }

    Ok(area)
}

/// Distinct mRIDs of both equipment lists, first occurrence first.
fn members<'a>(addressable: &'a [String], unaddressable: &'a [String]) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    addressable
        .iter()
        .chain(unaddressable)
        .map(String::as_str)
        .filter(|mrid| seen.insert(*mrid))
        .collect()
}
