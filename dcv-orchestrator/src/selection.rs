use dcv_common::{OsFamily, SizeClass};

/// A menu the operator answers when a choice was not passed as a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Menu {
    OperatingSystem,
    InstanceSize,
}

impl Menu {
    pub fn title(&self) -> &'static str {
        match self {
            Menu::OperatingSystem => "Operating system",
            Menu::InstanceSize => "Instance size",
        }
    }

    /// Choice labels, numbered from 1 in this order.
    pub fn options(&self) -> &'static [&'static str] {
        match self {
            Menu::OperatingSystem => &["Linux", "Windows"],
            Menu::InstanceSize => &["small (t2.nano)", "large (t2.large)"],
        }
    }
}

/// Resolve the OS and size from flags, asking `prompt` for whichever is
/// missing. The OS is validated before the size is asked for. Touches
/// neither the catalog nor a provider.
pub fn select(
    os: Option<&str>,
    size: Option<&str>,
    mut prompt: impl FnMut(Menu) -> anyhow::Result<String>,
) -> anyhow::Result<(OsFamily, SizeClass)> {
    let os = match os {
        Some(raw) => OsFamily::from_choice(raw)?,
        None => OsFamily::from_choice(&prompt(Menu::OperatingSystem)?)?,
    };
    let size = match size {
        Some(raw) => SizeClass::from_choice(raw)?,
        None => SizeClass::from_choice(&prompt(Menu::InstanceSize)?)?,
    };
    Ok((os, size))
}
