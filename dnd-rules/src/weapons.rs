//! Weapon definitions and properties.

use crate::catalog::{de, CatalogEntry};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Weapon properties as listed in the weapons table.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct WeaponProperties: u16 {
        const MELEE      = 1 << 0;
        const RANGED     = 1 << 1;
        const VERSATILE  = 1 << 2;
        const TWO_HANDED = 1 << 3;
        const MARTIAL    = 1 << 4;
        const FINESSE    = 1 << 5;
        const LIGHT      = 1 << 6;
        const HEAVY      = 1 << 7;
        const THROWN     = 1 << 8;
        const REACH      = 1 << 9;
        const AMMUNITION = 1 << 10;
        const LOADING    = 1 << 11;
    }
}

bitflags! {
    /// How an attack is delivered.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AttackType: u8 {
        const MELEE         = 1 << 0;
        const RANGE         = 1 << 1;
        const MARTIAL_MELEE = 1 << 2;
        const MARTIAL_RANGE = 1 << 3;
        const AREA          = 1 << 4;
    }
}

impl AttackType {
    /// Attack types that can add the proficiency bonus for a proficient weapon.
    pub const WEAPON_ATTACKS: AttackType = AttackType::MELEE
        .union(AttackType::RANGE)
        .union(AttackType::MARTIAL_MELEE)
        .union(AttackType::MARTIAL_RANGE);

    pub fn is_ranged(&self) -> bool {
        self.intersects(AttackType::RANGE | AttackType::MARTIAL_RANGE)
    }

    /// The attack type a weapon declares: melee if it has the melee
    /// property, otherwise ranged if it has the ranged property.
    pub fn declared_by(properties: WeaponProperties) -> AttackType {
        if properties.contains(WeaponProperties::MELEE) {
            AttackType::MELEE
        } else if properties.contains(WeaponProperties::RANGED) {
            AttackType::RANGE
        } else {
            AttackType::empty()
        }
    }
}

impl WeaponProperties {
    /// Parse a comma separated property list such as `Melee, Two-Handed`.
    ///
    /// Unknown names are reported back as the error.
    pub fn parse_list(list: &str) -> Result<WeaponProperties, String> {
        let mut properties = WeaponProperties::empty();
        for item in list.split([',', ';', '|']) {
            let key: String = item
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            let flag = match key.as_str() {
                "" | "none" => continue,
                "melee" => WeaponProperties::MELEE,
                "ranged" | "range" => WeaponProperties::RANGED,
                "versatile" => WeaponProperties::VERSATILE,
                "twohanded" => WeaponProperties::TWO_HANDED,
                "martial" => WeaponProperties::MARTIAL,
                "finesse" => WeaponProperties::FINESSE,
                "light" => WeaponProperties::LIGHT,
                "heavy" => WeaponProperties::HEAVY,
                "thrown" => WeaponProperties::THROWN,
                "reach" => WeaponProperties::REACH,
                "ammunition" => WeaponProperties::AMMUNITION,
                "loading" => WeaponProperties::LOADING,
                _ => return Err(format!("unknown weapon property '{}'", item.trim())),
            };
            properties |= flag;
        }
        Ok(properties)
    }
}

/// One row of the weapons table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaponRow {
    pub name: String,
    #[serde(default)]
    pub properties: String,
    #[serde(default, deserialize_with = "de::text")]
    pub damage_one_handed: String,
    #[serde(default, deserialize_with = "de::text")]
    pub damage_two_handed: String,
}

/// An immutable weapon definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaponDefinition {
    pub name: String,
    pub properties: WeaponProperties,
    pub damage_one_handed: String,
    pub damage_two_handed: String,
}

impl WeaponDefinition {
    pub fn new(name: impl Into<String>, properties: WeaponProperties, damage: &str) -> Self {
        Self {
            name: name.into(),
            properties,
            damage_one_handed: damage.to_string(),
            damage_two_handed: damage.to_string(),
        }
    }

    pub fn with_two_handed_damage(mut self, damage: &str) -> Self {
        self.damage_two_handed = damage.to_string();
        self
    }

    pub fn has(&self, property: WeaponProperties) -> bool {
        self.properties.contains(property)
    }
}

impl CatalogEntry for WeaponDefinition {
    type Row = WeaponRow;

    fn from_row(row: WeaponRow) -> Result<Self, String> {
        let properties = WeaponProperties::parse_list(&row.properties)?;
        let damage_two_handed = if row.damage_two_handed.trim().is_empty() {
            row.damage_one_handed.clone()
        } else {
            row.damage_two_handed
        };
        Ok(Self {
            name: row.name.trim().to_string(),
            properties,
            damage_one_handed: row.damage_one_handed,
            damage_two_handed,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_property_list() {
        let props = WeaponProperties::parse_list("Melee, Two-Handed, heavy").unwrap();
        assert_eq!(
            props,
            WeaponProperties::MELEE | WeaponProperties::TWO_HANDED | WeaponProperties::HEAVY
        );
        assert_eq!(
            WeaponProperties::parse_list("").unwrap(),
            WeaponProperties::empty()
        );
        assert!(WeaponProperties::parse_list("Melee, Sparkly").is_err());
    }

    #[test]
    fn test_declared_attack_type() {
        let spear = WeaponProperties::MELEE | WeaponProperties::RANGED;
        assert_eq!(AttackType::declared_by(spear), AttackType::MELEE);
        assert_eq!(
            AttackType::declared_by(WeaponProperties::RANGED),
            AttackType::RANGE
        );
        assert!(AttackType::declared_by(WeaponProperties::LIGHT).is_empty());
        assert!(AttackType::WEAPON_ATTACKS.contains(AttackType::MARTIAL_RANGE));
        assert!(!AttackType::WEAPON_ATTACKS.contains(AttackType::AREA));
    }

    #[test]
    fn test_row_two_handed_damage_defaults_to_one_handed() {
        let row: WeaponRow = serde_json::from_value(serde_json::json!({
            "name": "Dagger",
            "properties": "Melee, Finesse, Light, Thrown",
            "damageOneHanded": "1d4",
        }))
        .unwrap();
        let dagger = WeaponDefinition::from_row(row).unwrap();
        assert_eq!(dagger.damage_two_handed, "1d4");
        assert!(dagger.has(WeaponProperties::FINESSE));
        assert!(!dagger.has(WeaponProperties::VERSATILE));
    }
}
