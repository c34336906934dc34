//! Path and query parameters declared by a request.
//!
//! A request lists its parameters explicitly through
//! [`ApiRequest::params`](crate::ApiRequest::params). Each [`Param`] names the
//! placeholder or query key, carries the rendered value, and says whether an
//! empty value should be left out.

use std::borrow::Cow;

/// Where a parameter ends up in the outbound URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Substituted into a `{name}` placeholder of the path template.
    Path,
    /// Appended to the query string.
    Query,
}

/// A value that can be rendered as a path or query parameter.
///
/// Implemented for strings, integers, floats, `bool` and `Option<T>`. Implement
/// it for your own types to control rendering and to report emptiness, the way
/// a date type might report its zero value.
///
/// # Examples
///
/// ```
/// use omniapi::ParamValue;
///
/// struct Cursor(Option<String>);
///
/// impl ParamValue for Cursor {
///     fn render(&self) -> Option<String> {
///         self.0.clone()
///     }
///
///     fn is_empty_value(&self) -> bool {
///         self.0.as_deref().map_or(true, str::is_empty)
///     }
/// }
/// ```
pub trait ParamValue {
    /// Renders the value, or `None` if it is absent.
    ///
    /// Absent values are always left out, whether or not the parameter is
    /// marked omit-if-empty.
    fn render(&self) -> Option<String>;

    /// Returns `true` if the value is its type's zero value.
    fn is_empty_value(&self) -> bool;
}

impl ParamValue for str {
    fn render(&self) -> Option<String> {
        Some(self.to_string())
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl ParamValue for String {
    fn render(&self) -> Option<String> {
        Some(self.clone())
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl ParamValue for bool {
    fn render(&self) -> Option<String> {
        Some(self.to_string())
    }

    fn is_empty_value(&self) -> bool {
        !*self
    }
}

macro_rules! impl_param_value_for_numbers {
    ($zero:literal => $($ty:ty),+) => {
        $(
            impl ParamValue for $ty {
                fn render(&self) -> Option<String> {
                    Some(self.to_string())
                }

                fn is_empty_value(&self) -> bool {
                    *self == $zero
                }
            }
        )+
    };
}

impl_param_value_for_numbers!(0 => i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
impl_param_value_for_numbers!(0.0 => f32, f64);

impl<T: ParamValue + ?Sized> ParamValue for &T {
    fn render(&self) -> Option<String> {
        (**self).render()
    }

    fn is_empty_value(&self) -> bool {
        (**self).is_empty_value()
    }
}

/// A single optional layer: `None` is absent, `Some` defers to the inner value.
impl<T: ParamValue> ParamValue for Option<T> {
    fn render(&self) -> Option<String> {
        self.as_ref().and_then(ParamValue::render)
    }

    fn is_empty_value(&self) -> bool {
        self.as_ref().map_or(true, ParamValue::is_empty_value)
    }
}

/// A path or query parameter.
///
/// # Examples
///
/// ```
/// use omniapi::{Location, Param};
///
/// let page: Option<u32> = None;
/// let params = vec![
///     Param::path("id", &42u64),
///     Param::query("page", &page),
///     Param::query("verbose", &false).omit_empty(),
/// ];
///
/// assert_eq!(params[0].location(), Location::Path);
/// assert!(!params[1].is_included());
/// assert!(!params[2].is_included());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    name: Cow<'static, str>,
    value: Option<String>,
    empty: bool,
    location: Location,
    omit_empty: bool,
}

impl Param {
    /// Creates a parameter at the given location.
    pub fn new<V>(location: Location, name: impl Into<Cow<'static, str>>, value: &V) -> Self
    where
        V: ParamValue + ?Sized,
    {
        Self {
            name: name.into(),
            value: value.render(),
            empty: value.is_empty_value(),
            location,
            omit_empty: false,
        }
    }

    /// Creates a path parameter filling the `{name}` placeholder.
    pub fn path<V>(name: impl Into<Cow<'static, str>>, value: &V) -> Self
    where
        V: ParamValue + ?Sized,
    {
        Self::new(Location::Path, name, value)
    }

    /// Creates a query parameter.
    pub fn query<V>(name: impl Into<Cow<'static, str>>, value: &V) -> Self
    where
        V: ParamValue + ?Sized,
    {
        Self::new(Location::Query, name, value)
    }

    /// Leaves the parameter out when its value is empty.
    pub fn omit_empty(mut self) -> Self {
        self.omit_empty = true;
        self
    }

    /// The placeholder or query key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The rendered value, `None` if absent.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Where the parameter goes.
    pub fn location(&self) -> Location {
        self.location
    }

    /// Returns `true` if the parameter makes it into the URL.
    pub fn is_included(&self) -> bool {
        self.value.is_some() && !(self.omit_empty && self.empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values_without_omit_empty_are_kept() {
        assert!(Param::query("n", &0u32).is_included());
        assert!(Param::query("s", "").is_included());
        assert!(Param::query("b", &false).is_included());
    }

    #[test]
    fn test_zero_values_with_omit_empty_are_dropped() {
        assert!(!Param::query("n", &0i64).omit_empty().is_included());
        assert!(!Param::query("s", "").omit_empty().is_included());
        assert!(!Param::query("f", &0.0f64).omit_empty().is_included());
        assert!(Param::query("n", &7u8).omit_empty().is_included());
    }

    #[test]
    fn test_none_is_always_dropped() {
        let missing: Option<String> = None;
        assert!(!Param::query("q", &missing).is_included());
        assert!(!Param::path("q", &missing).omit_empty().is_included());
    }

    #[test]
    fn test_some_defers_to_inner_value() {
        let zero = Some(0u32);
        assert!(Param::query("q", &zero).is_included());
        assert!(!Param::query("q", &zero).omit_empty().is_included());
        assert_eq!(Param::query("q", &Some("x")).value(), Some("x"));
    }

    struct Epoch(u64);

    impl ParamValue for Epoch {
        fn render(&self) -> Option<String> {
            Some(self.0.to_string())
        }

        fn is_empty_value(&self) -> bool {
            self.0 == 0
        }
    }

    #[test]
    fn test_self_reported_emptiness() {
        assert!(!Param::query("since", &Epoch(0)).omit_empty().is_included());
        assert_eq!(Param::query("since", &Epoch(5)).value(), Some("5"));
    }
}
