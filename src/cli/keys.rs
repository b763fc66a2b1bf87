use std::sync::atomic::AtomicBool;

use strongbox::api::Strongbox;
use strongbox::error::Result;

use crate::cli::common::print_json;

/// The store was opened, so the decryptability check already passed.
pub fn check(strongbox: &Strongbox, json: bool) -> Result<()> {
    strongbox.check()?;
    let status = strongbox.key_status()?;
    if json {
        return print_json(&status);
    }

    for uuid in &status.configured {
        let marker = if *uuid == status.active { " (active)" } else { "" };
        let count = status.values_by_key.get(uuid).copied().unwrap_or(0);
        println!("{uuid}{marker}: {count} value(s)");
    }
    let unknown: u64 = status
        .values_by_key
        .iter()
        .filter(|(uuid, _)| !status.configured.contains(uuid))
        .map(|(_, count)| count)
        .sum();
    if unknown > 0 {
        println!("unconfigured keys: {unknown} value(s)");
    }
    println!("pending rotation: {}", status.pending_rotation);
    Ok(())
}

pub fn rotate(strongbox: &Strongbox, json: bool) -> Result<()> {
    let report = strongbox.rotate_all(&AtomicBool::new(false))?;
    if json {
        return print_json(&report);
    }
    eprintln!(
        "Rotated {} value(s), {} failed, {} still under inactive keys.",
        report.rotated, report.failed, report.remaining_after
    );
    Ok(())
}
