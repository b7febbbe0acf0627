//! Periodic countermeasures run by the session worker.

use crate::dom::{Document, Geometry};

use super::PageHost;

/// Report plausible ad-slot geometry for every hidden element, so detector
/// scripts probing size or load state see a rendered slot.
///
/// Returns the number of elements updated.
pub fn spoof_hidden_geometry<D: Document>(doc: &mut D) -> usize {
    let hidden: Vec<_> = doc
        .elements(&[])
        .into_iter()
        .filter(|&node| doc.is_hidden(node))
        .collect();

    let mut spoofed = 0;
    for node in hidden {
        match doc.expose_geometry(node, Geometry::PLAUSIBLE_SLOT) {
            Ok(()) => spoofed += 1,
            Err(e) => tracing::debug!("Failed to expose geometry: {e}"),
        }
    }
    spoofed
}

/// Halt in-flight navigation when the page is backgrounded or unfocused but
/// still claims to be visible, a common precursor of forced-redirect chains.
///
/// Returns `true` if navigation was stopped.
pub fn halt_hidden_redirect<H: PageHost>(host: &H) -> bool {
    let visibility = host.visibility();
    if (visibility.hidden || !visibility.focused) && visibility.reported_visible {
        tracing::warn!(?visibility, "Stopping navigation from backgrounded page");
        host.stop_navigation();
        return true;
    }
    false
}
