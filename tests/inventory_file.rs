use std::io::Write;

use oltlink::error::SessionError;
use oltlink::inventory::DeviceInventory;

fn write_csv(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write csv");
    file
}

#[test]
fn loads_devices_from_csv_file() {
    let file = write_csv("olt,ip\nOLT-1,10.0.0.5\nOLT-2,10.0.0.6\n");
    let inventory = DeviceInventory::load(file.path());

    assert_eq!(inventory.len(), 2);
    assert_eq!(inventory.address("OLT-1"), Some("10.0.0.5"));
    assert_eq!(inventory.address("OLT-2"), Some("10.0.0.6"));
    assert_eq!(inventory.address("OLT-3"), None);
}

#[test]
fn missing_file_is_empty_but_try_load_reports_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("devices.csv");

    assert!(DeviceInventory::load(&path).is_empty());
    assert!(matches!(
        DeviceInventory::try_load(&path),
        Err(SessionError::IoError(_))
    ));
}

#[test]
fn malformed_file_loads_as_empty() {
    let file = write_csv("device;address\nOLT-1;10.0.0.5\n");
    assert!(DeviceInventory::load(file.path()).is_empty());
    assert!(matches!(
        DeviceInventory::try_load(file.path()),
        Err(SessionError::InventoryFormatError(_))
    ));
}
