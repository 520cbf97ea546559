use std::fmt;

/// The four alignment classes that get independently trained models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Discordant,
    BadEnd,
    Concordant,
    Unpaired,
}

impl Category {
    /// All categories in processing order.
    pub const ALL: [Category; 4] = [
        Category::Discordant,
        Category::BadEnd,
        Category::Concordant,
        Category::Unpaired,
    ];

    /// One-letter tag used in file names and parameter headers
    pub fn short(&self) -> &'static str {
        match self {
            Category::Discordant => "d",
            Category::BadEnd => "b",
            Category::Concordant => "c",
            Category::Unpaired => "u",
        }
    }

    pub fn long(&self) -> &'static str {
        match self {
            Category::Discordant => "Discordant",
            Category::BadEnd => "Bad-end",
            Category::Concordant => "Concordant",
            Category::Unpaired => "Unpaired",
        }
    }

    /// Whether alignments in this category come from paired-end reads.
    pub fn paired(&self) -> bool {
        matches!(self, Category::Discordant | Category::Concordant)
    }

    pub fn from_short(tag: &str) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.short() == tag)
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.long())
    }
}

/// A fixed-size map with one optional slot per category.
#[derive(Debug, Clone)]
pub struct CategoryMap<T> {
    slots: [Option<T>; 4],
}

impl<T> Default for CategoryMap<T> {
    fn default() -> Self {
        Self {
            slots: [None, None, None, None],
        }
    }
}

impl<T> CategoryMap<T> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, cat: Category) -> Option<&T> {
        self.slots[cat.index()].as_ref()
    }

    pub fn get_mut(&mut self, cat: Category) -> Option<&mut T> {
        self.slots[cat.index()].as_mut()
    }

    pub fn contains(&self, cat: Category) -> bool {
        self.slots[cat.index()].is_some()
    }

    /// Store `value`, returning the previous occupant of the slot.
    pub fn insert(&mut self, cat: Category, value: T) -> Option<T> {
        self.slots[cat.index()].replace(value)
    }

    pub fn remove(&mut self, cat: Category) -> Option<T> {
        self.slots[cat.index()].take()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occupied slots in category order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &T)> {
        Category::ALL
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(c, s)| s.as_ref().map(|v| (*c, v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Category, &mut T)> {
        Category::ALL
            .iter()
            .zip(self.slots.iter_mut())
            .filter_map(|(c, s)| s.as_mut().map(|v| (*c, v)))
    }
}
