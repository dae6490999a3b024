use dcv_common::{CatalogEntry, OsFamily, ProvisionError, SizeClass};
use std::collections::HashMap;

// us-east-1 images with the DCV-capable base OS.
const BUILTIN: [(OsFamily, SizeClass, &str, &str); 4] = [
    (OsFamily::Linux, SizeClass::Small, "ami-0c55b159cbfafe1f0", "t2.nano"),
    (OsFamily::Linux, SizeClass::Large, "ami-0b69ea66ff7391e80", "t2.large"),
    (OsFamily::Windows, SizeClass::Small, "ami-061392db613a6357a", "t2.nano"),
    (OsFamily::Windows, SizeClass::Large, "ami-0b6a8a1b9c4febf14", "t2.large"),
];

/// (OS family, size class) -> (image, instance class).
///
/// Built and validated once at startup, read-only afterwards. Every pair of
/// the two enums has exactly one entry, so `lookup` cannot miss once `new`
/// has succeeded.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: HashMap<(OsFamily, SizeClass), CatalogEntry>,
}

impl Catalog {
    pub fn builtin() -> Result<Self, ProvisionError> {
        Self::from_entries(BUILTIN.iter().map(|(os, size, image, class)| {
            (
                *os,
                *size,
                CatalogEntry {
                    image_id: image.to_string(),
                    instance_class: class.to_string(),
                },
            )
        }))
    }

    pub fn from_entries(
        entries: impl IntoIterator<Item = (OsFamily, SizeClass, CatalogEntry)>,
    ) -> Result<Self, ProvisionError> {
        let mut map = HashMap::new();
        for (os, size, entry) in entries {
            if entry.image_id.trim().is_empty() || entry.instance_class.trim().is_empty() {
                return Err(ProvisionError::Configuration(format!(
                    "catalog entry for {}/{} has an empty identifier",
                    os, size
                )));
            }
            if map.insert((os, size), entry).is_some() {
                return Err(ProvisionError::Configuration(format!(
                    "catalog has more than one entry for {}/{}",
                    os, size
                )));
            }
        }

        for os in OsFamily::ALL {
            for size in SizeClass::ALL {
                if !map.contains_key(&(os, size)) {
                    return Err(ProvisionError::Configuration(format!(
                        "catalog has no entry for {}/{}",
                        os, size
                    )));
                }
            }
        }

        Ok(Self { entries: map })
    }

    /// Replace the image for one pair, keeping its instance class.
    /// Images are region specific; the built-in ones only exist in us-east-1.
    pub fn override_image(
        &mut self,
        os: OsFamily,
        size: SizeClass,
        image_id: &str,
    ) -> Result<(), ProvisionError> {
        let image_id = image_id.trim();
        if image_id.is_empty() {
            return Err(ProvisionError::Configuration(format!(
                "empty image override for {}/{}",
                os, size
            )));
        }
        let entry = self.entries.get_mut(&(os, size)).ok_or_else(|| {
            ProvisionError::Configuration(format!("catalog has no entry for {}/{}", os, size))
        })?;
        entry.image_id = image_id.to_string();
        Ok(())
    }

    pub fn lookup(&self, os: OsFamily, size: SizeClass) -> Result<&CatalogEntry, ProvisionError> {
        self.entries.get(&(os, size)).ok_or_else(|| {
            ProvisionError::Configuration(format!("catalog has no entry for {}/{}", os, size))
        })
    }
}
