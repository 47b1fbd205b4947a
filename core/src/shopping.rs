//! Shopping-list generation from planned recipes.
//!
//! Ingredient names are merged on a heuristic key (lowercase, leading article
//! stripped, naive singular). Quantities are summed only when units are
//! identical; the same ingredient in two different units stays as two lines.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::models::{Recipe, ShoppingItem, new_id};

pub const FALLBACK_CATEGORY: &str = "Autre";

/// Keyword -> grocery category. Matched by substring, longest keyword first.
const CATEGORY_KEYWORDS: &[(&str, &str)] = &[
    // Fruits et légumes
    ("pomme de terre", "Fruits et légumes"),
    ("potato", "Fruits et légumes"),
    ("pomme", "Fruits et légumes"),
    ("apple", "Fruits et légumes"),
    ("poire", "Fruits et légumes"),
    ("citron", "Fruits et légumes"),
    ("lemon", "Fruits et légumes"),
    ("tomate", "Fruits et légumes"),
    ("tomato", "Fruits et légumes"),
    ("oignon", "Fruits et légumes"),
    ("onion", "Fruits et légumes"),
    ("échalote", "Fruits et légumes"),
    ("ail", "Fruits et légumes"),
    ("garlic", "Fruits et légumes"),
    ("carotte", "Fruits et légumes"),
    ("carrot", "Fruits et légumes"),
    ("courgette", "Fruits et légumes"),
    ("poireau", "Fruits et légumes"),
    ("salade", "Fruits et légumes"),
    ("épinard", "Fruits et légumes"),
    ("champignon", "Fruits et légumes"),
    ("mushroom", "Fruits et légumes"),
    ("persil", "Fruits et légumes"),
    ("basilic", "Fruits et légumes"),
    ("coriandre", "Fruits et légumes"),
    ("banane", "Fruits et légumes"),
    // Viandes et poissons
    ("poulet", "Viandes et poissons"),
    ("chicken", "Viandes et poissons"),
    ("boeuf", "Viandes et poissons"),
    ("bœuf", "Viandes et poissons"),
    ("beef", "Viandes et poissons"),
    ("porc", "Viandes et poissons"),
    ("pork", "Viandes et poissons"),
    ("lardon", "Viandes et poissons"),
    ("jambon", "Viandes et poissons"),
    ("saumon", "Viandes et poissons"),
    ("salmon", "Viandes et poissons"),
    ("thon", "Viandes et poissons"),
    ("cabillaud", "Viandes et poissons"),
    ("crevette", "Viandes et poissons"),
    // Produits laitiers
    ("lait", "Produits laitiers"),
    ("milk", "Produits laitiers"),
    ("beurre", "Produits laitiers"),
    ("butter", "Produits laitiers"),
    ("crème", "Produits laitiers"),
    ("cream", "Produits laitiers"),
    ("yaourt", "Produits laitiers"),
    ("fromage", "Produits laitiers"),
    ("cheese", "Produits laitiers"),
    ("parmesan", "Produits laitiers"),
    ("gruyère", "Produits laitiers"),
    ("mozzarella", "Produits laitiers"),
    ("oeuf", "Produits laitiers"),
    ("œuf", "Produits laitiers"),
    ("egg", "Produits laitiers"),
    // Boulangerie
    ("pain", "Boulangerie"),
    ("bread", "Boulangerie"),
    ("baguette", "Boulangerie"),
    ("pâte feuilletée", "Boulangerie"),
    ("pâte brisée", "Boulangerie"),
    // Épicerie
    ("farine", "Épicerie"),
    ("flour", "Épicerie"),
    ("sucre", "Épicerie"),
    ("sugar", "Épicerie"),
    ("riz", "Épicerie"),
    ("rice", "Épicerie"),
    ("pâtes", "Épicerie"),
    ("pasta", "Épicerie"),
    ("chocolat", "Épicerie"),
    ("chocolate", "Épicerie"),
    ("levure", "Épicerie"),
    ("huile", "Épicerie"),
    ("oil", "Épicerie"),
    ("vinaigre", "Épicerie"),
    ("vinegar", "Épicerie"),
    ("lentille", "Épicerie"),
    ("bouillon", "Épicerie"),
    // Épices et condiments
    ("sel", "Épices et condiments"),
    ("salt", "Épices et condiments"),
    ("poivre", "Épices et condiments"),
    ("pepper", "Épices et condiments"),
    ("cannelle", "Épices et condiments"),
    ("cumin", "Épices et condiments"),
    ("paprika", "Épices et condiments"),
    ("moutarde", "Épices et condiments"),
    ("mustard", "Épices et condiments"),
    ("vanille", "Épices et condiments"),
    // Surgelés
    ("surgelé", "Surgelés"),
    ("frozen", "Surgelés"),
    // Boissons
    ("vin", "Boissons"),
    ("wine", "Boissons"),
    ("bière", "Boissons"),
    ("jus", "Boissons"),
];

static SORTED_KEYWORDS: LazyLock<Vec<(&'static str, &'static str)>> = LazyLock::new(|| {
    let mut keywords = CATEGORY_KEYWORDS.to_vec();
    keywords.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
    keywords
});

const LEADING_ARTICLES: &[&str] = &[
    "de la ", "de l'", "de l’", "des ", "du ", "le ", "la ", "les ", "l'", "l’", "un ", "une ",
    "d'", "d’", "the ", "a ", "an ", "some ",
];

/// Grocery category for an ingredient name, [`FALLBACK_CATEGORY`] when unknown.
#[must_use]
pub fn categorize(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    SORTED_KEYWORDS
        .iter()
        .find(|(keyword, _)| contains_word_prefix(&lower, keyword))
        .map_or(FALLBACK_CATEGORY, |(_, category)| *category)
}

/// Substring match anchored at a word start, so "sel" does not hit "persil"
/// and "ail" does not hit "volaille".
fn contains_word_prefix(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, _)| {
        haystack[..i]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric())
    })
}

/// Merge key for an ingredient name.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let mut lower = name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    for article in LEADING_ARTICLES {
        if let Some(rest) = lower.strip_prefix(article) {
            lower = rest.trim_start().to_string();
            break;
        }
    }
    lower
        .split(' ')
        .map(singularize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn singularize(word: &str) -> String {
    if word.chars().count() <= 3 || word.ends_with("ss") {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("oes") {
        return format!("{stem}o");
    }
    match word.strip_suffix('s').or_else(|| word.strip_suffix('x')) {
        Some(stem) => stem.to_string(),
        None => word.to_string(),
    }
}

/// Aggregate the ingredients of `recipes` into shopping items. A recipe that
/// appears twice contributes its quantities twice.
#[must_use]
pub fn aggregate_ingredients<'a>(recipes: impl IntoIterator<Item = &'a Recipe>) -> Vec<ShoppingItem> {
    let mut items: Vec<ShoppingItem> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for recipe in recipes {
        for ingredient in &recipe.ingredients {
            let name = ingredient.name.trim();
            if name.is_empty() {
                continue;
            }
            let unit = ingredient.unit.trim().to_string();
            let key = (normalize_name(name), unit.clone());

            if let Some(&i) = index.get(&key) {
                let item = &mut items[i];
                item.quantity = Some(item.quantity.unwrap_or(0.0) + ingredient.quantity);
                let sources = item.recipes.get_or_insert_with(Vec::new);
                if !sources.contains(&recipe.title) {
                    sources.push(recipe.title.clone());
                }
                continue;
            }

            index.insert(key, items.len());
            items.push(ShoppingItem {
                id: new_id(),
                name: name.to_string(),
                quantity: Some(ingredient.quantity),
                unit: (!unit.is_empty()).then_some(unit),
                checked: false,
                category: Some(categorize(name).to_string()),
                recipes: Some(vec![recipe.title.clone()]),
            });
        }
    }

    items.sort_by(|a, b| {
        let category = |item: &ShoppingItem| item.category.clone().unwrap_or_default();
        category(a)
            .cmp(&category(b))
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    items
}
