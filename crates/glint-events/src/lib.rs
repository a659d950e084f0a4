/// Native-side identity and event types for glint
///
/// This crate holds the handful of types that both the GUI toolkit side and the
/// script bridge need to agree on, so a toolkit implementation does not have to
/// depend on the whole host crate.
use std::fmt;
use std::num::NonZeroU64;

// ============================================================================
// Object identity
// ============================================================================

/// Opaque pointer to a natively-owned GUI object.
///
/// The bridge never dereferences this value itself; it is only ever handed back
/// to the toolkit, which decides whether it still names a live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectPtr(NonZeroU64);

impl ObjectPtr {
    /// Wrap a raw address. Returns `None` for the null address.
    pub const fn new(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(raw) => Some(ObjectPtr(raw)),
            None => None,
        }
    }

    /// The raw address
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ObjectPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0.get())
    }
}

// ============================================================================
// Event categories
// ============================================================================

/// Category of an event raised by the toolkit on an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Matches every category (subscription only, never raised)
    All,

    // Input events
    /// Object has been pressed
    Pressed,
    /// Object is being pressed (sent continuously while pressing)
    Pressing,
    /// Input device left the object while still pressed
    PressLost,
    /// Object was released after a press
    Released,
    /// Press and release without scrolling in between
    Clicked,
    /// Object was pressed for a long period
    LongPressed,
    /// Object is being scrolled
    Scroll,
    /// A key was sent to the object
    Key,
    /// Object was focused
    Focused,
    /// Object was defocused
    Defocused,

    // Notification events
    /// The object's value has changed
    ValueChanged,
    /// A process has finished
    Ready,
    /// A process has been cancelled
    Cancel,

    // Lifecycle
    /// Object is being deleted. Reserved by the toolkit; used only as a teardown trigger.
    Delete,
}

impl EventCategory {
    /// Check if this category (used as a subscription filter) matches a raised category
    pub fn matches(&self, raised: EventCategory) -> bool {
        match self {
            EventCategory::All => true,
            other => *other == raised,
        }
    }

    /// Whether this is the toolkit-reserved delete notification
    pub fn is_delete(&self) -> bool {
        matches!(self, EventCategory::Delete)
    }

    /// Convert a u32 discriminant to an EventCategory
    /// These discriminants are the numeric codes exposed to scripts
    pub fn from_discriminant(id: u32) -> Option<Self> {
        match id {
            0 => Some(EventCategory::All),
            // Input events (1-19)
            1 => Some(EventCategory::Pressed),
            2 => Some(EventCategory::Pressing),
            3 => Some(EventCategory::PressLost),
            4 => Some(EventCategory::Released),
            5 => Some(EventCategory::Clicked),
            6 => Some(EventCategory::LongPressed),
            7 => Some(EventCategory::Scroll),
            8 => Some(EventCategory::Key),
            9 => Some(EventCategory::Focused),
            10 => Some(EventCategory::Defocused),
            // Notification events (28-39)
            28 => Some(EventCategory::ValueChanged),
            31 => Some(EventCategory::Ready),
            32 => Some(EventCategory::Cancel),
            // Lifecycle
            33 => Some(EventCategory::Delete),
            _ => None,
        }
    }

    /// Get the discriminant value for this category
    pub fn to_discriminant(&self) -> u32 {
        match self {
            EventCategory::All => 0,
            EventCategory::Pressed => 1,
            EventCategory::Pressing => 2,
            EventCategory::PressLost => 3,
            EventCategory::Released => 4,
            EventCategory::Clicked => 5,
            EventCategory::LongPressed => 6,
            EventCategory::Scroll => 7,
            EventCategory::Key => 8,
            EventCategory::Focused => 9,
            EventCategory::Defocused => 10,
            EventCategory::ValueChanged => 28,
            EventCategory::Ready => 31,
            EventCategory::Cancel => 32,
            EventCategory::Delete => 33,
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Events
// ============================================================================

/// An event raised by the toolkit on one object
#[derive(Debug, Clone, PartialEq)]
pub struct NativeEvent {
    category: EventCategory,
    target: ObjectPtr,
    param: Option<i64>,
}

impl NativeEvent {
    pub fn new(category: EventCategory, target: ObjectPtr) -> Self {
        Self {
            category,
            target,
            param: None,
        }
    }

    /// Attach the category-specific parameter (key code, new value, ...)
    pub fn with_param(mut self, param: i64) -> Self {
        self.param = Some(param);
        self
    }

    pub fn category(&self) -> EventCategory {
        self.category
    }

    pub fn target(&self) -> ObjectPtr {
        self.target
    }

    pub fn param(&self) -> Option<i64> {
        self.param
    }
}
