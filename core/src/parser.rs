//! Recipe text parsing: ingredient lines, instructions, durations, yields,
//! and the mapping from a schema.org `Recipe` record to a [`ParsedRecipe`].

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::jsonld::{extract_records, find_recipe_record, has_type};
use crate::models::{DEFAULT_SERVINGS, Ingredient, NewRecipe};
use crate::units::{UNIT_TABLE, normalize_unit, parse_quantity};

/// Sections nested deeper than this are ignored.
const MAX_SECTION_DEPTH: usize = 8;

const QUANTITY_PATTERN: &str = r"\d+(?:[.,]\d+)?(?:\s+\d+/\d+|\s+[½¼¾⅓⅔])?|\d+/\d+|[½¼¾⅓⅔]";

static WITH_UNIT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let mut units: Vec<&str> = UNIT_TABLE.iter().map(|(spelling, _)| *spelling).collect();
    // Longest first so "tbsp" wins over "tbs" and "g" never shadows "gr".
    units.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = units
        .iter()
        .map(|u| regex::escape(u))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        r"(?i)^(?P<qty>{QUANTITY_PATTERN})\s*(?P<unit>{alternation})\.?(?:\s+|$)(?:(?:of|de)\s+|d['’]\s*)?(?P<name>.*)$"
    ))
    .expect("Invalid ingredient-with-unit regex")
});

static COUNT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?P<qty>{QUANTITY_PATTERN})\s+(?P<name>.+)$"))
        .expect("Invalid ingredient count regex")
});

static WHITESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

static NUMERIC_ENTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&#(?:[xX](?P<hex>[0-9a-fA-F]+)|(?P<dec>[0-9]+));").expect("Invalid entity regex")
});

static STEP_NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?P<n>\d+)\.\s").expect("Invalid step number regex"));

static STEP_PREFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\.\s*").expect("Invalid step prefix regex"));

static DURATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^P(?:(?P<d>\d+)D)?(?:T(?:(?P<h>\d+(?:[.,]\d+)?)H)?(?:(?P<m>\d+(?:[.,]\d+)?)M)?(?:(?P<s>\d+(?:[.,]\d+)?)S)?)?$",
    )
        .expect("Invalid duration regex")
});

static LEADING_INT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("Invalid integer regex"));

const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&rsquo;", "\u{2019}"),
    ("&lsquo;", "\u{2018}"),
    ("&rdquo;", "\u{201d}"),
    ("&ldquo;", "\u{201c}"),
    ("&hellip;", "\u{2026}"),
    ("&ndash;", "\u{2013}"),
    ("&mdash;", "\u{2014}"),
    ("&deg;", "\u{00b0}"),
    ("&frac12;", "½"),
    ("&frac14;", "¼"),
    ("&frac34;", "¾"),
    ("&eacute;", "é"),
    ("&egrave;", "è"),
    ("&ecirc;", "ê"),
    ("&agrave;", "à"),
    ("&acirc;", "â"),
    ("&ccedil;", "ç"),
    ("&ocirc;", "ô"),
    ("&ucirc;", "û"),
    ("&icirc;", "î"),
    ("&oelig;", "œ"),
    ("&reg;", "\u{00ae}"),
    ("&copy;", "\u{00a9}"),
    // Last so "&amp;lt;" decodes to "&lt;", not "<".
    ("&amp;", "&"),
];

/// A recipe as read from a page, before it is given an identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRecipe {
    pub title: String,
    pub source: String,
    pub image: Option<String>,
    pub prep_time: Option<u32>,
    pub cook_time: Option<u32>,
    pub servings: u32,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<String>,
}

impl From<ParsedRecipe> for NewRecipe {
    fn from(parsed: ParsedRecipe) -> Self {
        NewRecipe {
            title: parsed.title,
            source: Some(parsed.source),
            image: parsed.image,
            prep_time: parsed.prep_time,
            cook_time: parsed.cook_time,
            servings: Some(parsed.servings),
            ingredients: parsed.ingredients,
            steps: parsed.steps,
            notes: None,
        }
    }
}

/// Decode numeric and common named HTML entities.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let decoded = NUMERIC_ENTITY_REGEX.replace_all(text, |caps: &regex::Captures| {
        let code = match (caps.name("hex"), caps.name("dec")) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (None, Some(dec)) => dec.as_str().parse().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map_or_else(|| caps[0].to_string(), String::from)
    });
    let mut out = decoded.into_owned();
    for (entity, replacement) in NAMED_ENTITIES {
        if out.contains(entity) {
            out = out.replace(entity, replacement);
        }
    }
    out
}

fn clean_text(text: &str) -> String {
    WHITESPACE_REGEX
        .replace_all(&decode_entities(text), " ")
        .trim()
        .to_string()
}

/// Turn one free-text ingredient line into a structured ingredient.
#[must_use]
pub fn parse_ingredient_line(text: &str) -> Ingredient {
    let line = clean_text(text);

    if let Some(caps) = WITH_UNIT_REGEX.captures(&line) {
        let name = caps["name"].trim();
        if !name.is_empty() {
            return Ingredient {
                name: name.to_string(),
                quantity: parse_quantity(&caps["qty"]),
                unit: normalize_unit(&caps["unit"]),
                group: None,
            };
        }
    }

    if let Some(caps) = COUNT_REGEX.captures(&line) {
        return Ingredient {
            name: caps["name"].trim().to_string(),
            quantity: parse_quantity(&caps["qty"]),
            unit: String::new(),
            group: None,
        };
    }

    Ingredient {
        name: line,
        quantity: 1.0,
        unit: String::new(),
        group: None,
    }
}

/// Flatten a `recipeInstructions` value into ordered step strings.
#[must_use]
pub fn parse_instructions(value: &Value) -> Vec<String> {
    let mut steps = Vec::new();
    collect_instructions(value, 0, &mut steps);
    steps
}

fn collect_instructions(value: &Value, depth: usize, steps: &mut Vec<String>) {
    if depth > MAX_SECTION_DEPTH {
        return;
    }
    match value {
        Value::String(s) => {
            if depth == 0 {
                steps.extend(split_instruction_text(s));
            } else {
                let step = clean_text(s);
                if !step.is_empty() {
                    steps.push(step);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_instructions(item, depth + 1, steps);
            }
        }
        Value::Object(_) => {
            if has_type(value, "HowToSection") {
                if let Some(items) = value.get("itemListElement") {
                    collect_instructions(items, depth + 1, steps);
                }
            } else if let Some(text) = step_text(value) {
                let step = clean_text(text);
                if !step.is_empty() {
                    steps.push(step);
                }
            }
        }
        _ => {}
    }
}

/// First present of `text`, `description`, `name`.
fn step_text(value: &Value) -> Option<&str> {
    ["text", "description", "name"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
}

/// Split a single instructions string on newlines and before "<n>. " markers.
fn split_instruction_text(text: &str) -> Vec<String> {
    let decoded = decode_entities(text);
    decoded
        .lines()
        .flat_map(split_numbered_line)
        .map(|piece| clean_text(&STEP_PREFIX_REGEX.replace(piece, "")))
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// A line that opens with "<n>. " is split before "<n+1>. ", "<n+2>. " and
/// so on. Other numbers followed by a period ("180. ") stay in their step.
fn split_numbered_line(line: &str) -> Vec<&str> {
    let mut markers = STEP_NUMBER_REGEX.captures_iter(line).filter_map(|caps| {
        let start = caps.get(0)?.start();
        let number: u32 = caps["n"].parse().ok()?;
        Some((start, number))
    });
    let Some((first, number)) = markers.next() else {
        return vec![line];
    };
    if !line[..first].trim().is_empty() {
        return vec![line];
    }

    let mut pieces = Vec::new();
    let mut start = first;
    let mut expected = number.saturating_add(1);
    for (at, n) in markers {
        if n == expected {
            pieces.push(&line[start..at]);
            start = at;
            expected = expected.saturating_add(1);
        }
    }
    pieces.push(&line[start..]);
    pieces
}

/// Minutes in an ISO-8601 duration of the form `P[<d>D][T[<h>H][<m>M][<s>S]]`,
/// rounded to the nearest minute. At least one component must be present.
#[must_use]
pub fn parse_duration(text: Option<&str>) -> Option<u32> {
    let caps = DURATION_REGEX.captures(text?.trim())?;
    let mut present = false;
    let mut component = |name: &str| -> f64 {
        match caps.name(name) {
            Some(m) => {
                present = true;
                m.as_str().replace(',', ".").parse().unwrap_or(0.0)
            }
            None => 0.0,
        }
    };
    let minutes = component("d") * 1440.0
        + component("h") * 60.0
        + component("m")
        + component("s") / 60.0;
    if !present {
        return None;
    }
    Some(minutes.round().min(f64::from(u32::MAX)) as u32)
}

/// Serving count from a `recipeYield` value, defaulting to 4.
#[must_use]
pub fn parse_serving_count(value: Option<&Value>) -> u32 {
    let count = match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 1.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => leading_integer(s),
        Some(Value::Array(items)) => items.first().and_then(|first| match first {
            Value::String(s) => leading_integer(s),
            Value::Number(_) => Some(parse_serving_count(Some(first))),
            _ => None,
        }),
        _ => None,
    };
    count.filter(|n| *n > 0).unwrap_or(DEFAULT_SERVINGS)
}

fn leading_integer(text: &str) -> Option<u32> {
    LEADING_INT_REGEX
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
}

fn image_from(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => image_from(items.first()),
        Value::Object(obj) => obj.get("url").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Build a [`ParsedRecipe`] from the first schema.org `Recipe` found in the markup.
#[must_use]
pub fn parse_recipe_from_markup(markup: &str, source_url: &str) -> Option<ParsedRecipe> {
    let records = extract_records(markup);
    let record = find_recipe_record(&records)?;

    let title = record
        .get("name")
        .and_then(Value::as_str)
        .map(clean_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "untitled".to_string());

    let ingredient_lines = record
        .get("recipeIngredient")
        .or_else(|| record.get("ingredients"));
    let ingredients = match ingredient_lines {
        Some(Value::Array(lines)) => lines
            .iter()
            .filter_map(Value::as_str)
            .filter(|l| !l.trim().is_empty())
            .map(parse_ingredient_line)
            .collect(),
        Some(Value::String(line)) if !line.trim().is_empty() => {
            vec![parse_ingredient_line(line)]
        }
        _ => Vec::new(),
    };

    let steps = record
        .get("recipeInstructions")
        .map(parse_instructions)
        .unwrap_or_default();

    Some(ParsedRecipe {
        title,
        source: source_url.to_string(),
        image: image_from(record.get("image")),
        prep_time: parse_duration(record.get("prepTime").and_then(Value::as_str)),
        cook_time: parse_duration(record.get("cookTime").and_then(Value::as_str)),
        servings: parse_serving_count(record.get("recipeYield")),
        ingredients,
        steps,
    })
}

/// Upgrade `http://` to `https://`; `data:` URLs and anything else pass through.
#[must_use]
pub fn secure_image_url(url: Option<&str>) -> Option<String> {
    let url = url?;
    if url.starts_with("data:") {
        return Some(url.to_string());
    }
    match url.strip_prefix("http://") {
        Some(rest) => Some(format!("https://{rest}")),
        None => Some(url.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::UNIT_TABLE;
    use serde_json::json;

    #[test]
    fn test_ingredient_with_unit_and_de() {
        let ing = parse_ingredient_line("200g de farine");
        assert_eq!(ing.quantity, 200.0);
        assert_eq!(ing.unit, "g");
        assert_eq!(ing.name, "farine");
    }

    #[test]
    fn test_ingredient_english_unit() {
        let ing = parse_ingredient_line("2 cups flour");
        assert_eq!(ing.quantity, 2.0);
        assert_eq!(ing.unit, "tasses");
        assert_eq!(ing.name, "flour");
    }

    #[test]
    fn test_ingredient_plain_name() {
        let ing = parse_ingredient_line("sel");
        assert_eq!(ing.quantity, 1.0);
        assert_eq!(ing.unit, "");
        assert_eq!(ing.name, "sel");
    }

    #[test]
    fn test_ingredient_count_only() {
        let ing = parse_ingredient_line("3 oeufs");
        assert_eq!(ing.quantity, 3.0);
        assert_eq!(ing.unit, "");
        assert_eq!(ing.name, "oeufs");
    }

    #[test]
    fn test_ingredient_unit_prefix_of_word_not_matched() {
        // "g" must not be taken from "gousses" or "grosses".
        let ing = parse_ingredient_line("2 grosses pommes");
        assert_eq!(ing.unit, "");
        assert_eq!(ing.name, "grosses pommes");

        let ing = parse_ingredient_line("2 gousses d'ail");
        assert_eq!(ing.unit, "gousse");
        assert_eq!(ing.name, "ail");
    }

    #[test]
    fn test_ingredient_mixed_fraction_and_entities() {
        let ing = parse_ingredient_line("1 1/2 tbsp olive&nbsp;oil &amp; herbs");
        assert_eq!(ing.quantity, 1.5);
        assert_eq!(ing.unit, "c. à soupe");
        assert_eq!(ing.name, "olive oil & herbs");
    }

    #[test]
    fn test_ingredient_whole_and_vulgar_fraction() {
        let ing = parse_ingredient_line("1 ½ cup farine");
        assert_eq!(ing.quantity, 1.5);
        assert_eq!(ing.unit, "tasses");
        assert_eq!(ing.name, "farine");

        let ing = parse_ingredient_line("2 ¼ oignons");
        assert_eq!(ing.quantity, 2.25);
        assert_eq!(ing.name, "oignons");
    }

    #[test]
    fn test_ingredient_decimal_comma_and_of() {
        let ing = parse_ingredient_line("  0,5   l   of   milk ");
        assert_eq!(ing.quantity, 0.5);
        assert_eq!(ing.unit, "l");
        assert_eq!(ing.name, "milk");
    }

    #[test]
    fn test_ingredient_multiword_french_unit() {
        let ing = parse_ingredient_line("2 cuillères à soupe de sucre");
        assert_eq!(ing.unit, "c. à soupe");
        assert_eq!(ing.name, "sucre");
    }

    #[test]
    fn test_ingredient_de_not_taken_from_word() {
        let ing = parse_ingredient_line("100 g dessert chocolate");
        assert_eq!(ing.unit, "g");
        assert_eq!(ing.name, "dessert chocolate");
    }

    #[test]
    fn test_every_table_unit_is_matched() {
        for (spelling, canonical) in UNIT_TABLE {
            let ing = parse_ingredient_line(&format!("2 {spelling} stuff"));
            assert_eq!(ing.unit, *canonical, "unit spelling {spelling}");
            assert_eq!(ing.name, "stuff", "unit spelling {spelling}");
        }
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("caf&eacute;"), "café");
        assert_eq!(decode_entities("&#233;t&#xE9;"), "été");
        assert_eq!(decode_entities("a &amp;lt; b"), "a &lt; b");
        assert_eq!(decode_entities("no entities"), "no entities");
        assert_eq!(decode_entities("&#99999999;"), "&#99999999;");
    }

    #[test]
    fn test_instructions_array_of_strings_and_steps() {
        let value = json!([
            "Préchauffer le four",
            {"@type": "HowToStep", "text": "Mélanger &amp; verser"},
            {"@type": "HowToStep", "name": "Cuire"},
            {"@type": "Unknown"}
        ]);
        assert_eq!(
            parse_instructions(&value),
            vec!["Préchauffer le four", "Mélanger & verser", "Cuire"]
        );
    }

    #[test]
    fn test_instructions_sections_recurse() {
        let value = json!([
            {
                "@type": "HowToSection",
                "name": "Pâte",
                "itemListElement": [
                    {"@type": "HowToStep", "text": "Step A"},
                    {"@type": "HowToStep", "text": "Step B"}
                ]
            },
            {"@type": "HowToStep", "text": "Step C"}
        ]);
        assert_eq!(
            parse_instructions(&value),
            vec!["Step A", "Step B", "Step C"]
        );
    }

    #[test]
    fn test_instructions_string_split_on_newlines_and_numbers() {
        let value = json!("1. Mix flour. 2. Add eggs\n3. Bake\n\n");
        assert_eq!(
            parse_instructions(&value),
            vec!["Mix flour.", "Add eggs", "Bake"]
        );
    }

    #[test]
    fn test_instructions_number_inside_sentence_kept() {
        let value = json!("Préchauffer à 180. Enfourner 20 min.");
        assert_eq!(
            parse_instructions(&value),
            vec!["Préchauffer à 180. Enfourner 20 min."]
        );

        let value = json!("1. Chauffer à 180. Attendre 2. Enfourner");
        assert_eq!(
            parse_instructions(&value),
            vec!["Chauffer à 180. Attendre", "Enfourner"]
        );
    }

    #[test]
    fn test_instructions_single_object() {
        let value = json!({"@type": "HowToStep", "text": "Tout mélanger"});
        assert_eq!(parse_instructions(&value), vec!["Tout mélanger"]);
    }

    #[test]
    fn test_instructions_other_values() {
        assert!(parse_instructions(&json!(null)).is_empty());
        assert!(parse_instructions(&json!(42)).is_empty());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration(Some("PT1H30M")), Some(90));
        assert_eq!(parse_duration(Some("PT15M")), Some(15));
        assert_eq!(parse_duration(Some("PT2H")), Some(120));
        assert_eq!(parse_duration(Some("P0DT1H5M")), Some(65));
        assert_eq!(parse_duration(None), None);
        assert_eq!(parse_duration(Some("15 minutes")), None);
    }

    #[test]
    fn test_parse_duration_strict_forms() {
        assert_eq!(parse_duration(Some("PT")), None);
        assert_eq!(parse_duration(Some("P")), None);
        assert_eq!(parse_duration(Some("PT15Mextra")), None);
        assert_eq!(parse_duration(Some("PT1.5H")), Some(90));
        assert_eq!(parse_duration(Some("PT0,25H")), Some(15));
        assert_eq!(parse_duration(Some("PT1H30M0S")), Some(90));
        assert_eq!(parse_duration(Some("P1D")), Some(1440));
        assert_eq!(parse_duration(Some("PT0M")), Some(0));
    }

    #[test]
    fn test_parse_serving_count() {
        assert_eq!(parse_serving_count(Some(&json!(6))), 6);
        assert_eq!(parse_serving_count(Some(&json!("8 servings"))), 8);
        assert_eq!(parse_serving_count(Some(&json!(["2", "2 portions"]))), 2);
        assert_eq!(parse_serving_count(Some(&json!([3]))), 3);
        assert_eq!(parse_serving_count(Some(&json!("a few"))), 4);
        assert_eq!(parse_serving_count(Some(&json!(0))), 4);
        assert_eq!(parse_serving_count(None), 4);
    }

    #[test]
    fn test_secure_image_url() {
        assert_eq!(
            secure_image_url(Some("http://x/y.jpg")).as_deref(),
            Some("https://x/y.jpg")
        );
        assert_eq!(
            secure_image_url(Some("data:image/png;base64,AAA")).as_deref(),
            Some("data:image/png;base64,AAA")
        );
        assert_eq!(
            secure_image_url(Some("https://x/y.jpg")).as_deref(),
            Some("https://x/y.jpg")
        );
        assert_eq!(secure_image_url(None), None);
    }

    fn sample_page() -> String {
        r#"<html><head>
        <script type="application/ld+json">{"@type":"WebSite","name":"Blog"}</script>
        <script type="application/ld+json">
        {"@context":"https://schema.org","@graph":[
            {"@type":"Organization"},
            {"@type":["Recipe"],
             "name":"Cr&ecirc;pes",
             "image":[{"url":"http://img.example/crepes.jpg"}],
             "prepTime":"PT10M","cookTime":"PT1H",
             "recipeYield":["6","6 crêpes"],
             "recipeIngredient":["250 g de farine","3 oeufs","sel",""],
             "recipeInstructions":[{"@type":"HowToStep","text":"Mélanger"},{"@type":"HowToStep","text":"Cuire"}]}
        ]}
        </script></head><body></body></html>"#
            .to_string()
    }

    #[test]
    fn test_parse_recipe_from_markup() {
        let recipe = parse_recipe_from_markup(&sample_page(), "https://example.com/crepes").unwrap();
        assert_eq!(recipe.title, "Crêpes");
        assert_eq!(recipe.source, "https://example.com/crepes");
        assert_eq!(recipe.image.as_deref(), Some("http://img.example/crepes.jpg"));
        assert_eq!(recipe.prep_time, Some(10));
        assert_eq!(recipe.cook_time, Some(60));
        assert_eq!(recipe.servings, 6);
        assert_eq!(recipe.ingredients.len(), 3);
        assert_eq!(recipe.ingredients[0].unit, "g");
        assert_eq!(recipe.ingredients[0].name, "farine");
        assert_eq!(recipe.steps, vec!["Mélanger", "Cuire"]);
    }

    #[test]
    fn test_parse_recipe_untitled_and_missing_fields() {
        let page = r#"<script type="application/ld+json">{"@type":"Recipe","image":"https://x/a.png"}</script>"#;
        let recipe = parse_recipe_from_markup(page, "u").unwrap();
        assert_eq!(recipe.title, "untitled");
        assert_eq!(recipe.image.as_deref(), Some("https://x/a.png"));
        assert_eq!(recipe.servings, 4);
        assert!(recipe.ingredients.is_empty());
        assert!(recipe.steps.is_empty());
        assert_eq!(recipe.prep_time, None);
    }

    #[test]
    fn test_parse_recipe_none_without_markup() {
        assert!(parse_recipe_from_markup("<html></html>", "u").is_none());
    }

    #[test]
    fn test_parsed_recipe_into_new_recipe() {
        let parsed = parse_recipe_from_markup(&sample_page(), "https://example.com/crepes").unwrap();
        let recipe = NewRecipe::from(parsed).into_recipe().unwrap();
        assert_eq!(recipe.source.as_deref(), Some("https://example.com/crepes"));
        assert_eq!(recipe.servings, 6);
    }
}
