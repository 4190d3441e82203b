//! Autocomplete handlers for Discord slash command parameters.
//!
//! Suggestions are filtered case-insensitively on the partial input and capped at Discord's
//! limit of 25 entries.

use crate::{
    bot::Context,
    core::inventory,
    entities::category,
};

/// Discord autocomplete limit.
const MAX_SUGGESTIONS: usize = 25;

/// Matching names, sorted alphabetically.
#[must_use]
pub fn filter_names<I>(names: I, partial: &str) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let partial_lower = partial.to_lowercase();
    let mut matching: Vec<String> = names
        .into_iter()
        .filter(|name| name.to_lowercase().contains(&partial_lower))
        .collect();
    matching.sort();
    matching.truncate(MAX_SUGGESTIONS);
    matching
}

fn category_names(categories: Vec<category::Model>) -> impl Iterator<Item = String> {
    categories.into_iter().map(|c| c.name)
}

/// Countries with stock, for buyers.
pub async fn autocomplete_available_country(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let Ok(categories) = inventory::list_available_categories(&ctx.data().database).await else {
        return Vec::new();
    };
    filter_names(category_names(categories), partial)
}

/// Every country, for admins.
pub async fn autocomplete_country(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let Ok(categories) = inventory::list_categories(&ctx.data().database).await else {
        return Vec::new();
    };
    filter_names(category_names(categories), partial)
}

/// Countries with at least one sale, for broadcasts to buyers.
pub async fn autocomplete_sold_country(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let Ok(categories) = inventory::categories_with_sales(&ctx.data().database).await else {
        return Vec::new();
    };
    filter_names(category_names(categories), partial)
}

/// Manual payment methods from the configuration file.
#[allow(clippy::unused_async)] // poise awaits every autocomplete callback
pub async fn autocomplete_payment_method(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let names = ctx
        .data()
        .payment_config
        .payment_methods
        .iter()
        .map(|m| m.name.clone());
    filter_names(names, partial)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_names_is_case_insensitive_and_sorted() {
        let names = ["Myanmar", "Kenya", "Malaysia"].map(String::from);
        assert_eq!(filter_names(names.clone(), "MA"), vec!["Malaysia", "Myanmar"]);
        assert_eq!(filter_names(names, "").len(), 3);
    }

    #[test]
    fn test_filter_names_caps_suggestions() {
        let names = (0..40).map(|i| format!("Country {i:02}"));
        assert_eq!(filter_names(names, "country").len(), MAX_SUGGESTIONS);
    }
}
