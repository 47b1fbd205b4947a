use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};

use carnet_core::models::{Identified, Recipe, ShoppingList};

/// Characters of an id shown in tables and accepted as a prefix.
pub(crate) const SHORT_ID_LEN: usize = 8;

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Day of the week as a Monday-based offset. Accepts 0-6 or a day name.
pub(crate) fn parse_day(s: &str) -> Result<u8> {
    let lower = s.trim().to_lowercase();
    if let Ok(n) = lower.parse::<u8>() {
        if n <= 6 {
            return Ok(n);
        }
        bail!("Day must be between 0 (Monday) and 6 (Sunday)");
    }
    let day = match lower.as_str() {
        "mon" | "monday" | "lun" | "lundi" => 0,
        "tue" | "tuesday" | "mar" | "mardi" => 1,
        "wed" | "wednesday" | "mer" | "mercredi" => 2,
        "thu" | "thursday" | "jeu" | "jeudi" => 3,
        "fri" | "friday" | "ven" | "vendredi" => 4,
        "sat" | "saturday" | "sam" | "samedi" => 5,
        "sun" | "sunday" | "dim" | "dimanche" => 6,
        _ => bail!("Invalid day '{s}'. Use 0-6 or a day name (monday, lundi, ...)"),
    };
    Ok(day)
}

pub(crate) fn day_name(day: u8) -> &'static str {
    match day {
        0 => "Monday",
        1 => "Tuesday",
        2 => "Wednesday",
        3 => "Thursday",
        4 => "Friday",
        5 => "Saturday",
        _ => "Sunday",
    }
}

pub(crate) fn short_id(id: &str) -> &str {
    id.char_indices()
        .nth(SHORT_ID_LEN)
        .map_or(id, |(i, _)| &id[..i])
}

/// Find a record by exact id or unique id prefix.
pub(crate) fn find_by_id<'a, T: Identified>(items: &'a [T], query: &str, kind: &str) -> Result<&'a T> {
    let query = query.trim();
    if query.is_empty() {
        bail!("Empty {kind} id");
    }
    if let Some(exact) = items.iter().find(|i| i.id() == query) {
        return Ok(exact);
    }
    let matches: Vec<&T> = items.iter().filter(|i| i.id().starts_with(query)).collect();
    match matches.as_slice() {
        [one] => Ok(*one),
        [] => bail!("No {kind} matches '{query}'"),
        _ => bail!("'{query}' matches {} {kind}s; use a longer id", matches.len()),
    }
}

/// Resolve a recipe from an id, an id prefix, or its exact title.
pub(crate) fn find_recipe<'a>(recipes: &'a [Recipe], query: &str) -> Result<&'a Recipe> {
    let by_title: Vec<&Recipe> = recipes
        .iter()
        .filter(|r| r.title.to_lowercase() == query.trim().to_lowercase())
        .collect();
    if let [one] = by_title.as_slice() {
        return Ok(*one);
    }
    find_by_id(recipes, query, "recipe")
}

pub(crate) fn find_list<'a>(lists: &'a [ShoppingList], query: &str) -> Result<&'a ShoppingList> {
    find_by_id(lists, query, "shopping list")
}

pub(crate) fn format_minutes(minutes: Option<u32>) -> String {
    match minutes {
        None => "-".to_string(),
        Some(m) if m < 60 => format!("{m} min"),
        Some(m) if m % 60 == 0 => format!("{} h", m / 60),
        Some(m) => format!("{} h {:02}", m / 60, m % 60),
    }
}

/// Quantity without a trailing ".0" for whole numbers.
pub(crate) fn format_quantity(quantity: f64) -> String {
    if quantity.fract() == 0.0 && quantity.abs() < 1e9 {
        format!("{quantity:.0}")
    } else {
        let text = format!("{quantity:.2}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carnet_core::models::NewRecipe;

    fn recipe(title: &str, id: &str) -> Recipe {
        let mut r = NewRecipe {
            title: title.to_string(),
            ..NewRecipe::default()
        }
        .into_recipe()
        .unwrap();
        r.id = id.to_string();
        r
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
        assert_eq!(
            parse_date(Some("yesterday".to_string())).unwrap(),
            today - chrono::Duration::days(1)
        );
        assert_eq!(
            parse_date(Some("2024-01-15".to_string())).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert!(parse_date(Some("nope".to_string())).is_err());
    }

    #[test]
    fn test_parse_day() {
        assert_eq!(parse_day("0").unwrap(), 0);
        assert_eq!(parse_day("Mercredi").unwrap(), 2);
        assert_eq!(parse_day("sun").unwrap(), 6);
        assert!(parse_day("7").is_err());
        assert!(parse_day("someday").is_err());
        assert_eq!(day_name(parse_day("fri").unwrap()), "Friday");
    }

    #[test]
    fn test_find_recipe() {
        let recipes = vec![
            recipe("Tarte", "abc12345-0000"),
            recipe("Soupe", "abd99999-0000"),
        ];
        assert_eq!(find_recipe(&recipes, "tarte").unwrap().id, "abc12345-0000");
        assert_eq!(find_recipe(&recipes, "abd").unwrap().title, "Soupe");
        assert!(find_recipe(&recipes, "ab").is_err());
        assert!(find_recipe(&recipes, "zzz").is_err());
        assert!(find_recipe(&recipes, " ").is_err());
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(None), "-");
        assert_eq!(format_minutes(Some(45)), "45 min");
        assert_eq!(format_minutes(Some(120)), "2 h");
        assert_eq!(format_minutes(Some(95)), "1 h 35");
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(200.0), "200");
        assert_eq!(format_quantity(0.5), "0.5");
        assert_eq!(format_quantity(1.25), "1.25");
        assert_eq!(format_quantity(1.0 / 3.0), "0.33");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
        assert_eq!(truncate("Müsli", 10), "Müsli");
    }
}
