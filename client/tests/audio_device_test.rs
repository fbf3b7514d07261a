//! Audio device enumeration against the real host
//!
//! Machines without audio hardware (CI containers) report no devices; the
//! tests only check what is there.

use lumeai_lib::audio::{AudioError, DeviceKind, list_input_devices, list_output_devices};

#[test]
fn test_list_input_devices_integration() {
    match list_input_devices() {
        Ok(devices) => {
            println!("\n=== Audio Input Devices ===");
            for device in &devices {
                println!(
                    "  {} (default: {}) {:?}",
                    device.name, device.is_default, device.sample_rates
                );
            }

            assert!(!devices.is_empty());
            for device in &devices {
                assert_eq!(device.kind, DeviceKind::Input);
                assert!(!device.name.is_empty(), "Device name should not be empty");
                assert_eq!(device.id, device.name);
            }
        }
        Err(AudioError::DeviceNotFound) => {
            println!("No input devices on this machine");
        }
        Err(e) => println!("Input enumeration unavailable: {}", e),
    }
}

#[test]
fn test_list_output_devices_integration() {
    match list_output_devices() {
        Ok(devices) => {
            println!("\n=== Audio Output Devices ===");
            for device in &devices {
                println!("  {} (default: {})", device.name, device.is_default);
                assert_eq!(device.kind, DeviceKind::Output);
            }
            assert!(!devices.is_empty());
        }
        Err(e) => println!("Output enumeration unavailable: {}", e),
    }
}
