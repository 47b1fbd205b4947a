//! Quantity and unit normalization.
//!
//! Every unit spelling the normalizer knows maps to one canonical French
//! token. The ingredient-line pattern in [`crate::parser`] is generated from
//! the same table, so the two can never drift apart.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Lowercase unit spelling -> canonical token.
pub const UNIT_TABLE: &[(&str, &str)] = &[
    // Weight
    ("g", "g"),
    ("gr", "g"),
    ("gram", "g"),
    ("grams", "g"),
    ("gramme", "g"),
    ("grammes", "g"),
    ("kg", "kg"),
    ("kilo", "kg"),
    ("kilos", "kg"),
    ("kilogram", "kg"),
    ("kilograms", "kg"),
    ("kilogramme", "kg"),
    ("kilogrammes", "kg"),
    ("mg", "mg"),
    ("oz", "oz"),
    ("ounce", "oz"),
    ("ounces", "oz"),
    ("lb", "lb"),
    ("lbs", "lb"),
    ("pound", "lb"),
    ("pounds", "lb"),
    // Volume
    ("ml", "ml"),
    ("milliliter", "ml"),
    ("milliliters", "ml"),
    ("millilitre", "ml"),
    ("millilitres", "ml"),
    ("cl", "cl"),
    ("centilitre", "cl"),
    ("centilitres", "cl"),
    ("dl", "dl"),
    ("décilitre", "dl"),
    ("décilitres", "dl"),
    ("l", "l"),
    ("liter", "l"),
    ("liters", "l"),
    ("litre", "l"),
    ("litres", "l"),
    ("cup", "tasses"),
    ("cups", "tasses"),
    ("tasse", "tasses"),
    ("tasses", "tasses"),
    ("tbsp", "c. à soupe"),
    ("tbs", "c. à soupe"),
    ("tablespoon", "c. à soupe"),
    ("tablespoons", "c. à soupe"),
    ("c. à soupe", "c. à soupe"),
    ("c.à.s", "c. à soupe"),
    ("cas", "c. à soupe"),
    ("cuillère à soupe", "c. à soupe"),
    ("cuillères à soupe", "c. à soupe"),
    ("tsp", "c. à café"),
    ("teaspoon", "c. à café"),
    ("teaspoons", "c. à café"),
    ("c. à café", "c. à café"),
    ("c.à.c", "c. à café"),
    ("cac", "c. à café"),
    ("cuillère à café", "c. à café"),
    ("cuillères à café", "c. à café"),
    // Count-like
    ("pinch", "pincée"),
    ("pinches", "pincée"),
    ("pincée", "pincée"),
    ("pincées", "pincée"),
    ("clove", "gousse"),
    ("cloves", "gousse"),
    ("gousse", "gousse"),
    ("gousses", "gousse"),
    ("slice", "tranche"),
    ("slices", "tranche"),
    ("tranche", "tranche"),
    ("tranches", "tranche"),
    ("bunch", "botte"),
    ("bunches", "botte"),
    ("botte", "botte"),
    ("bottes", "botte"),
    ("can", "boîte"),
    ("cans", "boîte"),
    ("boîte", "boîte"),
    ("boîtes", "boîte"),
    ("packet", "sachet"),
    ("packets", "sachet"),
    ("sachet", "sachet"),
    ("sachets", "sachet"),
    ("sprig", "brin"),
    ("sprigs", "brin"),
    ("brin", "brin"),
    ("brins", "brin"),
    ("leaf", "feuille"),
    ("leaves", "feuille"),
    ("feuille", "feuille"),
    ("feuilles", "feuille"),
];

static UNIT_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| UNIT_TABLE.iter().copied().collect());

/// Unicode vulgar fractions accepted as quantity tokens.
pub const VULGAR_FRACTIONS: &[(char, f64)] = &[
    ('½', 0.5),
    ('¼', 0.25),
    ('¾', 0.75),
    ('⅓', 1.0 / 3.0),
    ('⅔', 2.0 / 3.0),
];

/// Parse a free-text quantity, summing whitespace-separated tokens
/// ("1 1/2" is 1.5). Either '.' or ',' may be the decimal separator.
/// Anything unparseable yields 1.
#[must_use]
pub fn parse_quantity(text: &str) -> f64 {
    let normalized = text.trim().replace(',', ".");
    let mut total = 0.0;
    let mut tokens = 0;
    for token in normalized.split_whitespace() {
        let Some(value) = parse_quantity_token(token) else {
            return 1.0;
        };
        total += value;
        tokens += 1;
    }
    if tokens == 0 || !total.is_finite() || total < 0.0 {
        return 1.0;
    }
    total
}

fn parse_quantity_token(token: &str) -> Option<f64> {
    if let Some((_, value)) = VULGAR_FRACTIONS
        .iter()
        .find(|(c, _)| token.chars().eq(std::iter::once(*c)))
    {
        return Some(*value);
    }
    if let Some((num, den)) = token.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    token.parse().ok()
}

/// Map a unit spelling to its canonical token. Unknown units pass through.
#[must_use]
pub fn normalize_unit(text: &str) -> String {
    let key = text.trim().to_lowercase();
    match UNIT_MAP.get(key.as_str()) {
        Some(canonical) => (*canonical).to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity_decimals() {
        assert_eq!(parse_quantity("2"), 2.0);
        assert_eq!(parse_quantity("2.5"), 2.5);
        assert_eq!(parse_quantity("2,5"), 2.5);
        assert_eq!(parse_quantity(" 200 "), 200.0);
    }

    #[test]
    fn test_parse_quantity_fractions() {
        assert_eq!(parse_quantity("1/2"), 0.5);
        assert_eq!(parse_quantity("1 1/2"), 1.5);
        assert_eq!(parse_quantity("2 3/4"), 2.75);
        assert_eq!(parse_quantity("½"), 0.5);
        assert_eq!(parse_quantity("1 ½"), 1.5);
    }

    #[test]
    fn test_parse_quantity_fallback() {
        assert_eq!(parse_quantity(""), 1.0);
        assert_eq!(parse_quantity("a pinch"), 1.0);
        assert_eq!(parse_quantity("1/0"), 1.0);
        assert_eq!(parse_quantity("2 lots"), 1.0);
        assert_eq!(parse_quantity("-3"), 1.0);
    }

    #[test]
    fn test_normalize_unit_table() {
        for (spelling, canonical) in UNIT_TABLE {
            assert_eq!(normalize_unit(spelling), *canonical, "spelling {spelling}");
        }
    }

    #[test]
    fn test_normalize_unit_examples() {
        assert_eq!(normalize_unit("cups"), "tasses");
        assert_eq!(normalize_unit("TBSP"), "c. à soupe");
        assert_eq!(normalize_unit("g"), "g");
        assert_eq!(normalize_unit("Cuillères à café"), "c. à café");
    }

    #[test]
    fn test_normalize_unit_passthrough() {
        assert_eq!(normalize_unit("poignée"), "poignée");
        assert_eq!(normalize_unit("Handful"), "Handful");
        assert_eq!(normalize_unit("Litres"), "l");
    }

    #[test]
    fn test_unit_table_keys_are_lowercase() {
        for (spelling, _) in UNIT_TABLE {
            assert_eq!(*spelling, spelling.to_lowercase());
        }
    }
}
