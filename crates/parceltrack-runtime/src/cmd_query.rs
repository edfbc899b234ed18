//! One-shot commands: `show`, `history`, `validate`.

use parceltrack_core::TrackingNumber;
use parceltrack_runtime::{FetchError, SyncConfig, TrackingService};

use crate::render::{format_history, format_view};

/// Entry point for `parceltrack show`.
pub async fn cmd_show(config: SyncConfig, id: &TrackingNumber, use_color: bool) -> anyhow::Result<()> {
    let service = TrackingService::http(config);
    match service.lookup(id).await {
        Ok(view) => {
            println!("{}", format_view(&view, use_color));
            Ok(())
        }
        Err(FetchError::NotFound(_)) => anyhow::bail!("no shipment found for {id}"),
        Err(e) => Err(e.into()),
    }
}

/// Entry point for `parceltrack history`.
pub async fn cmd_history(config: SyncConfig, id: &TrackingNumber) -> anyhow::Result<()> {
    let service = TrackingService::http(config);
    let entries = service.history(id).await?;
    println!("{}", format_history(&entries));
    Ok(())
}

/// Entry point for `parceltrack validate`. Returns the process exit code.
pub async fn cmd_validate(config: SyncConfig, id: &TrackingNumber) -> anyhow::Result<i32> {
    let service = TrackingService::http(config);
    let valid = service.validate(id).await?;
    println!("{}", validity_line(id, valid));
    Ok(if valid { 0 } else { 1 })
}

fn validity_line(id: &TrackingNumber, valid: bool) -> String {
    if valid {
        format!("{id}: valid")
    } else {
        format!("{id}: unknown tracking number")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_wording() {
        let id = TrackingNumber::parse("UPS1").expect("valid");
        assert_eq!(validity_line(&id, true), "UPS1: valid");
        assert_eq!(validity_line(&id, false), "UPS1: unknown tracking number");
    }
}
