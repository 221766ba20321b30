//! Keyword-based ingredient categorization for list grouping

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Produce,
    Dairy,
    Meat,
    Seafood,
    Pantry,
    Bakery,
    Frozen,
    Beverages,
    #[default]
    Other,
}

// Checked in order; more specific phrases come before the words they contain.
const KEYWORDS: &[(Category, &[&str])] = &[
    (Category::Frozen, &["frozen", "ice cream"]),
    (
        Category::Dairy,
        &[
            "coconut milk", "sour cream", "cottage cheese", "greek yogurt", "heavy cream",
            "buttermilk", "cheese", "butter", "cream", "yogurt", "mozzarella", "cheddar",
            "parmesan", "feta", "ricotta", "milk",
        ],
    ),
    (
        Category::Seafood,
        &[
            "salmon", "tuna", "shrimp", "crab", "lobster", "cod", "halibut", "tilapia",
            "scallops", "mussels", "clams", "oysters", "fish",
        ],
    ),
    (
        Category::Meat,
        &[
            "chicken", "beef", "pork", "lamb", "turkey", "bacon", "ham", "sausage", "steak",
            "ribs", "tenderloin",
        ],
    ),
    (
        Category::Bakery,
        &["bread", "baguette", "bagel", "tortilla", "pita", "croissant", "bun"],
    ),
    (
        Category::Beverages,
        &["juice", "coffee", "tea", "soda", "water", "wine", "beer"],
    ),
    (
        Category::Produce,
        &[
            "bell pepper", "tomato", "onion", "garlic", "carrot", "potato", "lettuce", "spinach",
            "cucumber", "mushroom", "broccoli", "cauliflower", "cabbage", "celery", "lemon",
            "lime", "orange", "apple", "banana", "berry", "berries", "avocado", "ginger", "chili",
            "zucchini", "eggplant", "squash", "pumpkin", "corn", "peas", "beans", "lentils",
            "herbs", "basil", "parsley", "cilantro",
        ],
    ),
    (
        Category::Pantry,
        &[
            "salt", "pepper", "oil", "vinegar", "rice", "pasta", "flour", "sugar", "honey",
            "oats", "quinoa", "spice", "sauce", "stock", "broth", "nuts", "eggs", "egg",
        ],
    ),
];

/// Category for a normalized item name
pub fn categorize(name: &str) -> Category {
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| name.contains(w)))
        .map_or(Category::Other, |(category, _)| *category)
}
