//! `Accept-Encoding` parsing and encoding selection.
//!
//! Negotiation never fails: a malformed header degrades to identity rather
//! than rejecting the request.

use crate::codec::Codec;

/// One entry parsed from an `Accept-Encoding` header.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Preference<'a> {
    token: &'a str,
    quality: f32,
}

/// Splits a raw `Accept-Encoding` value into its preference entries.
///
/// Parsing is permissive: a missing or malformed q-value counts as 1.0,
/// out-of-range values are clamped to [0, 1], and empty entries are dropped.
fn parse(header: &str) -> impl Iterator<Item = Preference<'_>> {
    header.split(',').filter_map(|entry| {
        let mut parts = entry.split(';');
        let token = parts.next().unwrap_or("").trim();
        if token.is_empty() {
            return None;
        }
        let quality = parts
            .find_map(|param| {
                let param = param.trim();
                param
                    .get(..2)
                    .filter(|prefix| prefix.eq_ignore_ascii_case("q="))
                    .and_then(|_| param[2..].trim().parse::<f32>().ok())
            })
            .filter(|q| q.is_finite())
            .map_or(1.0, |q| q.clamp(0.0, 1.0));
        Some(Preference { token, quality })
    })
}

/// Selects the response encoding for a request.
///
/// `supported` is the configured encoding set in priority order. Each
/// supported codec takes the quality of its explicit entry, falling back to
/// the `*` wildcard for codecs the client did not list; a quality of zero
/// rejects the codec. The highest quality wins, and ties go to the codec
/// listed earliest in `supported`, so selection is deterministic for a given
/// configuration. Returns `None` (identity) when the client accepts nothing
/// the set can produce.
pub(crate) fn negotiate(header: &str, supported: &[Codec]) -> Option<Codec> {
    // First occurrence wins per codec; duplicate entries are noise.
    let mut qualities: Vec<Option<f32>> = vec![None; supported.len()];
    let mut wildcard: Option<f32> = None;

    for pref in parse(header) {
        if pref.token == "*" {
            wildcard.get_or_insert(pref.quality);
            continue;
        }
        for (slot, codec) in qualities.iter_mut().zip(supported) {
            if slot.is_none() && codec.matches_token(pref.token) {
                *slot = Some(pref.quality);
            }
        }
    }

    let mut best: Option<(Codec, f32)> = None;
    for (slot, &codec) in qualities.iter().zip(supported) {
        let quality = match slot.or(wildcard) {
            Some(q) if q > 0.0 => q,
            _ => continue,
        };
        match best {
            Some((_, top)) if quality <= top => {}
            _ => best = Some((codec, quality)),
        }
    }
    best.map(|(codec, _)| codec)
}
