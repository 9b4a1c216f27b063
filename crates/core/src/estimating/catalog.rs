//! Static material, labor and supplier tables the estimator and order
//! planner read from.

use rust_decimal::Decimal;

use crate::domain::assessment::DamageType;
use crate::domain::quote::SkillLevel;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaterialSpec {
    pub code: &'static str,
    pub description: &'static str,
    pub unit: &'static str,
    unit_cost_cents: i64,
    pub supplier_id: &'static str,
}

impl MaterialSpec {
    pub fn unit_cost(&self) -> Decimal {
        Decimal::new(self.unit_cost_cents, 2)
    }
}

/// How much of a material a job needs before the severity multiplier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuantityBasis {
    /// `area * factor * 10^-scale`
    PerSqFt { factor: i64, scale: u32 },
    Fixed(u32),
}

impl QuantityBasis {
    pub fn base_quantity(self, area: u32) -> Decimal {
        match self {
            Self::PerSqFt { factor, scale } => Decimal::from(area) * Decimal::new(factor, scale),
            Self::Fixed(count) => Decimal::from(count),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaterialRequirement {
    pub material: &'static str,
    pub basis: QuantityBasis,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaborSpec {
    pub task: &'static str,
    pub skill_level: SkillLevel,
    fixed_tenths: i64,
    per_100_sq_ft_tenths: i64,
}

impl LaborSpec {
    pub fn fixed_hours(&self) -> Decimal {
        Decimal::new(self.fixed_tenths, 1)
    }

    pub fn hours_per_100_sq_ft(&self) -> Decimal {
        Decimal::new(self.per_100_sq_ft_tenths, 1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SupplierSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub standard_lead_days: u32,
    pub expedited_lead_days: u32,
    expedite_fee_cents: i64,
}

impl SupplierSpec {
    pub fn expedite_fee(&self) -> Decimal {
        Decimal::new(self.expedite_fee_cents, 2)
    }
}

impl SkillLevel {
    pub fn base_rate(self) -> Decimal {
        match self {
            Self::Basic => Decimal::new(3500, 2),
            Self::Skilled => Decimal::new(5500, 2),
            Self::Specialist => Decimal::new(7500, 2),
        }
    }
}

pub const MATERIALS: &[MaterialSpec] = &[
    material("asphalt_shingles", "Architectural asphalt shingles", "sq_ft", 350, "abc_supply"),
    material("underlayment", "Synthetic underlayment", "sq_ft", 45, "abc_supply"),
    material("roofing_nails", "Galvanized roofing nails", "lb", 225, "beacon"),
    material("roof_sealant", "Polyurethane roof sealant", "tube", 899, "beacon"),
    material("plywood_decking", "1/2 in. plywood decking, 4x8 sheet", "sheet", 4200, "beacon"),
    material("ridge_cap", "Ridge cap shingles", "lin_ft", 275, "abc_supply"),
    material("step_flashing", "Aluminum step flashing", "lin_ft", 650, "srs"),
    material("ice_water_shield", "Ice and water shield membrane", "sq_ft", 125, "srs"),
    material("drip_edge", "Aluminum drip edge", "lin_ft", 210, "srs"),
];

pub const SUPPLIERS: &[SupplierSpec] = &[
    SupplierSpec {
        id: "abc_supply",
        name: "ABC Supply Co.",
        standard_lead_days: 2,
        expedited_lead_days: 1,
        expedite_fee_cents: 7500,
    },
    SupplierSpec {
        id: "beacon",
        name: "Beacon Building Products",
        standard_lead_days: 3,
        expedited_lead_days: 1,
        expedite_fee_cents: 9500,
    },
    SupplierSpec {
        id: "srs",
        name: "SRS Distribution",
        standard_lead_days: 5,
        expedited_lead_days: 2,
        expedite_fee_cents: 12000,
    },
];

const fn material(
    code: &'static str,
    description: &'static str,
    unit: &'static str,
    unit_cost_cents: i64,
    supplier_id: &'static str,
) -> MaterialSpec {
    MaterialSpec { code, description, unit, unit_cost_cents, supplier_id }
}

const fn per_sq_ft(material: &'static str, factor: i64, scale: u32) -> MaterialRequirement {
    MaterialRequirement { material, basis: QuantityBasis::PerSqFt { factor, scale } }
}

const fn fixed(material: &'static str, count: u32) -> MaterialRequirement {
    MaterialRequirement { material, basis: QuantityBasis::Fixed(count) }
}

const fn labor(
    task: &'static str,
    skill_level: SkillLevel,
    fixed_tenths: i64,
    per_100_sq_ft_tenths: i64,
) -> LaborSpec {
    LaborSpec { task, skill_level, fixed_tenths, per_100_sq_ft_tenths }
}

pub fn find_material(code: &str) -> Option<&'static MaterialSpec> {
    MATERIALS.iter().find(|spec| spec.code == code)
}

pub fn find_supplier(id: &str) -> Option<&'static SupplierSpec> {
    SUPPLIERS.iter().find(|spec| spec.id == id)
}

const ROOF_LEAK_MATERIALS: &[MaterialRequirement] = &[
    per_sq_ft("asphalt_shingles", 1, 0),
    per_sq_ft("underlayment", 1, 0),
    per_sq_ft("roofing_nails", 2, 2),
    fixed("roof_sealant", 3),
];

const STORM_DAMAGE_MATERIALS: &[MaterialRequirement] = &[
    per_sq_ft("asphalt_shingles", 1, 0),
    per_sq_ft("underlayment", 1, 0),
    per_sq_ft("plywood_decking", 3125, 5),
    per_sq_ft("roofing_nails", 2, 2),
    fixed("ridge_cap", 20),
];

const MISSING_SHINGLES_MATERIALS: &[MaterialRequirement] = &[
    per_sq_ft("asphalt_shingles", 1, 0),
    per_sq_ft("roofing_nails", 2, 2),
    fixed("roof_sealant", 2),
];

const FLASHING_DAMAGE_MATERIALS: &[MaterialRequirement] = &[
    per_sq_ft("step_flashing", 25, 2),
    fixed("roof_sealant", 4),
    fixed("roofing_nails", 2),
];

// 10% shingle waste on a full tear-off.
const FULL_REPLACEMENT_MATERIALS: &[MaterialRequirement] = &[
    per_sq_ft("asphalt_shingles", 11, 1),
    per_sq_ft("underlayment", 1, 0),
    per_sq_ft("ice_water_shield", 2, 1),
    per_sq_ft("plywood_decking", 3125, 5),
    per_sq_ft("drip_edge", 15, 2),
    fixed("ridge_cap", 30),
    per_sq_ft("roofing_nails", 25, 3),
];

const ROOF_LEAK_LABOR: &[LaborSpec] = &[
    labor("Leak inspection and source tracing", SkillLevel::Specialist, 15, 0),
    labor("Shingle and underlayment replacement", SkillLevel::Skilled, 0, 20),
    labor("Site cleanup and debris haul", SkillLevel::Basic, 10, 5),
];

const STORM_DAMAGE_LABOR: &[LaborSpec] = &[
    labor("Storm damage assessment", SkillLevel::Specialist, 20, 0),
    labor("Decking repair", SkillLevel::Skilled, 0, 10),
    labor("Shingle replacement", SkillLevel::Skilled, 0, 20),
    labor("Tarp removal and cleanup", SkillLevel::Basic, 10, 8),
];

const MISSING_SHINGLES_LABOR: &[LaborSpec] = &[
    labor("Shingle matching and replacement", SkillLevel::Skilled, 5, 15),
    labor("Site cleanup", SkillLevel::Basic, 5, 3),
];

const FLASHING_DAMAGE_LABOR: &[LaborSpec] = &[
    labor("Flashing removal and install", SkillLevel::Specialist, 10, 30),
    labor("Sealing and water test", SkillLevel::Skilled, 10, 0),
    labor("Site cleanup", SkillLevel::Basic, 5, 3),
];

const FULL_REPLACEMENT_LABOR: &[LaborSpec] = &[
    labor("Tear-off", SkillLevel::Basic, 0, 20),
    labor("Deck inspection and repair", SkillLevel::Skilled, 10, 5),
    labor("Underlayment and membrane install", SkillLevel::Skilled, 0, 10),
    labor("Shingle install", SkillLevel::Skilled, 0, 25),
    labor("Flashing and ridge detailing", SkillLevel::Specialist, 20, 3),
    labor("Final cleanup and magnetic sweep", SkillLevel::Basic, 20, 3),
];

pub fn material_requirements(damage_type: DamageType) -> &'static [MaterialRequirement] {
    match damage_type {
        DamageType::RoofLeak => ROOF_LEAK_MATERIALS,
        DamageType::StormDamage => STORM_DAMAGE_MATERIALS,
        DamageType::MissingShingles => MISSING_SHINGLES_MATERIALS,
        DamageType::FlashingDamage => FLASHING_DAMAGE_MATERIALS,
        DamageType::FullReplacement => FULL_REPLACEMENT_MATERIALS,
    }
}

pub fn labor_requirements(damage_type: DamageType) -> &'static [LaborSpec] {
    match damage_type {
        DamageType::RoofLeak => ROOF_LEAK_LABOR,
        DamageType::StormDamage => STORM_DAMAGE_LABOR,
        DamageType::MissingShingles => MISSING_SHINGLES_LABOR,
        DamageType::FlashingDamage => FLASHING_DAMAGE_LABOR,
        DamageType::FullReplacement => FULL_REPLACEMENT_LABOR,
    }
}
