/// Tracks mutable access to a value using a dirty flag.
///
/// The dirty flag is asserted whenever this type's `DerefMut` impl is
/// invoked, or when `Dirty::modify` actually changes the value, and can be
/// reset via `Dirty::clean`.
///
/// Values are initially dirty when created or cloned, so the first consumer
/// always observes them.
#[derive(Copy, Debug, Default)]
pub struct Dirty<T> {
    is_clean: bool,
    inner: T,
}

impl<T> Dirty<T> {
    /// Creates a new dirty value.
    pub fn new(inner: T) -> Self {
        Self {
            is_clean: false,
            inner,
        }
    }

    /// Forcibly dirties the value.
    pub fn dirty(this: &mut Self) {
        this.is_clean = false;
    }

    /// Returns whether the value has changed since it was last cleaned.
    pub fn is_dirty(this: &Self) -> bool {
        !this.is_clean
    }

    /// Marks the value as clean and returns whether it was dirty.
    ///
    /// The `update` callback is invoked if the value is dirty. If the callback
    /// fails by returning an error, the value will remain dirty and unchanged.
    pub fn clean<E>(
        this: &mut Self,
        update: impl FnOnce(&T) -> Result<(), E>,
    ) -> Result<bool, E> {
        if this.is_clean {
            return Ok(false);
        }

        update(&this.inner)?;
        this.is_clean = true;

        Ok(true)
    }
}

impl<T: PartialEq> Dirty<T> {
    /// Replaces the value, dirtying it only if the new value differs.
    pub fn replace(this: &mut Self, value: T) -> bool {
        if this.inner == value {
            return false;
        }

        this.inner = value;
        this.is_clean = false;

        true
    }
}

impl<T: Clone + PartialEq> Dirty<T> {
    /// Allows mutating the value and dirties it if it was changed.
    pub fn modify(this: &mut Self, callback: impl FnOnce(&mut T)) -> bool {
        let mut modified = this.inner.clone();

        callback(&mut modified);

        Self::replace(this, modified)
    }
}

impl<T: Clone> Clone for Dirty<T> {
    fn clone(&self) -> Self {
        Self::new(self.inner.clone())
    }
}

impl<T> std::ops::Deref for Dirty<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> std::ops::DerefMut for Dirty<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.is_clean = false;

        &mut self.inner
    }
}

impl<T: PartialEq> PartialEq for Dirty<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.eq(&other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_values_start_dirty() {
        let mut value = Dirty::new(3);

        assert_eq!(Dirty::clean(&mut value, |_| Ok::<_, ()>(())), Ok(true));
        assert_eq!(Dirty::clean(&mut value, |_| Ok::<_, ()>(())), Ok(false));
    }

    #[test]
    fn replace_with_equal_value_stays_clean() {
        let mut value = Dirty::new(String::from("a"));
        let _ = Dirty::clean(&mut value, |_| Ok::<_, ()>(()));

        assert!(!Dirty::replace(&mut value, String::from("a")));
        assert!(!Dirty::is_dirty(&value));

        assert!(Dirty::replace(&mut value, String::from("b")));
        assert!(Dirty::is_dirty(&value));
    }

    #[test]
    fn failed_clean_keeps_value_dirty() {
        let mut value = Dirty::new(1);

        assert_eq!(Dirty::clean(&mut value, |_| Err("nope")), Err("nope"));
        assert!(Dirty::is_dirty(&value));
    }

    #[test]
    fn modify_only_dirties_on_change() {
        let mut value = Dirty::new([1, 2]);
        let _ = Dirty::clean(&mut value, |_| Ok::<_, ()>(()));

        assert!(!Dirty::modify(&mut value, |v| v[0] = 1));
        assert!(Dirty::modify(&mut value, |v| v[1] = 5));
        assert_eq!(*value, [1, 5]);
    }
}
