pub mod file;
pub mod kitchen;
pub mod recipe;
pub mod watch;

use std::path::PathBuf;

use clap::Args;

use galley_core::{KitchenName, RecipeName};

/// Kitchen and recipe selection shared by the recipe and file commands.
#[derive(Args, Debug, Clone)]
pub struct RecipeTarget {
    /// Kitchen on the remote.
    #[arg(short, long)]
    pub kitchen: String,

    /// Recipe within the kitchen.
    #[arg(short, long)]
    pub recipe: String,

    /// Local directory holding the kitchen's recipes.
    #[arg(long, default_value = ".")]
    pub kitchen_dir: PathBuf,
}

impl RecipeTarget {
    pub fn kitchen(&self) -> KitchenName {
        KitchenName::from(self.kitchen.as_str())
    }

    pub fn recipe(&self) -> RecipeName {
        RecipeName::from(self.recipe.as_str())
    }

    /// `<kitchen_dir>/<recipe>`
    pub fn recipe_dir(&self) -> PathBuf {
        self.kitchen_dir.join(&self.recipe)
    }
}

/// Source and target of a kitchen merge.
#[derive(Args, Debug, Clone)]
pub struct MergePair {
    /// Kitchen whose changes are merged.
    #[arg(long)]
    pub source_kitchen: String,

    /// Kitchen receiving the changes.
    #[arg(long)]
    pub target_kitchen: String,
}

impl MergePair {
    pub fn source(&self) -> KitchenName {
        KitchenName::from(self.source_kitchen.as_str())
    }

    pub fn target(&self) -> KitchenName {
        KitchenName::from(self.target_kitchen.as_str())
    }
}
