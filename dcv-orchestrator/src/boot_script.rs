use dcv_common::OsFamily;

/// Name of the virtual session created on Linux guests.
pub const SESSION_NAME: &str = "dcv-session";

const LINUX_SESSION_OWNER: &str = "ec2-user";
const WINDOWS_SESSION_OWNER: &str = "Administrator";
const WINDOWS_SERVER_MSI_URL: &str =
    "https://d1uj6qtbmh3dt5.cloudfront.net/nice-dcv-server-x64-Release.msi";

/// First-boot payload that installs the DCV server and brings up a session.
/// Raw bytes; providers apply their own transport encoding.
pub fn generate(os: OsFamily) -> Vec<u8> {
    match os {
        OsFamily::Linux => build_linux_script(),
        OsFamily::Windows => build_windows_script(),
    }
    .into_bytes()
}

fn build_linux_script() -> String {
    let mut script = String::new();
    script.push_str("#!/bin/bash\n");
    script.push_str("set -euo pipefail\n");
    script.push_str("echo '[dcv-bootstrap] starting'\n");
    script.push_str("yum update -y\n");
    script.push_str("yum install -y dcv-server dcv-gl-renderer dcv-web-viewer\n");
    script.push_str("systemctl enable --now dcvserver\n");
    script.push_str(&format!(
        "dcv create-session --type virtual-session --owner {} {}\n",
        LINUX_SESSION_OWNER, SESSION_NAME
    ));
    script.push_str("echo '[dcv-bootstrap] done'\n");
    script
}

fn build_windows_script() -> String {
    let mut script = String::new();
    script.push_str("<powershell>\n");
    script.push_str("$ErrorActionPreference = 'Stop'\n");
    script.push_str("Write-Output '[dcv-bootstrap] installing NICE DCV server'\n");
    script.push_str(&format!(
        "$msi = Join-Path $env:TEMP 'nice-dcv-server.msi'\n\
         Invoke-WebRequest -Uri '{}' -OutFile $msi -UseBasicParsing\n",
        WINDOWS_SERVER_MSI_URL
    ));
    script.push_str(&format!(
        "Start-Process msiexec.exe -Wait -ArgumentList \"/i `\"$msi`\" /quiet /norestart ADDLOCAL=ALL AUTOMATIC_SESSION_OWNER={}\"\n",
        WINDOWS_SESSION_OWNER
    ));
    script.push_str("Set-Service -Name dcvserver -StartupType Automatic\n");
    script.push_str("Restart-Service -Name dcvserver\n");
    script.push_str("Write-Output '[dcv-bootstrap] done'\n");
    script.push_str("</powershell>\n");
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_deterministic() {
        for os in OsFamily::ALL {
            assert_eq!(generate(os), generate(os));
        }
    }

    #[test]
    fn linux_script_installs_and_starts_session() {
        let script = String::from_utf8(generate(OsFamily::Linux)).unwrap();
        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("yum install -y dcv-server dcv-gl-renderer dcv-web-viewer"));
        assert!(script.contains(
            "dcv create-session --type virtual-session --owner ec2-user dcv-session"
        ));
    }

    #[test]
    fn windows_script_is_a_powershell_block() {
        let script = String::from_utf8(generate(OsFamily::Windows)).unwrap();
        assert!(script.starts_with("<powershell>\n"));
        assert!(script.trim_end().ends_with("</powershell>"));
        assert!(script.contains("msiexec.exe"));
        assert!(script.contains("AUTOMATIC_SESSION_OWNER=Administrator"));
    }

    #[test]
    fn scripts_differ_per_os() {
        assert_ne!(generate(OsFamily::Linux), generate(OsFamily::Windows));
    }
}
