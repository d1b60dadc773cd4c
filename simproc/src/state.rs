use std::any::Any;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of the IDs telling apart the stores of different simulations.
static NEXT_STORE: AtomicU64 = AtomicU64::new(0);

/// Handle to a value in a [`State`], returned by [`State::insert`].
///
/// The key remembers the type of the value, so it cannot be used to read a value of another
/// type:
///
/// ```compile_fail
/// # use simproc::State;
/// let mut state = State::default();
/// let key = state.insert(String::from("medium"));
/// let _: Option<&u64> = state.get(key);
/// ```
///
/// It also remembers the store that issued it. Looking it up in any other store finds nothing:
///
/// ```
/// # use simproc::State;
/// let mut first = State::default();
/// let second = State::default();
/// let key = first.insert(7_u64);
/// assert_eq!(first.get(key), Some(&7));
/// assert_eq!(second.get(key), None);
/// ```
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Key<V> {
    index: usize,
    store: u64,
    _marker: PhantomData<V>,
}

impl<V> Clone for Key<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Key<V> {}

/// Values shared by all processes of one simulation, e.g., the shared medium or the counters
/// read once the run is over.
///
/// Missing values, and keys issued by another store, are reported as `None`; processes turn
/// that into [`Error::MissingValue`](crate::Error::MissingValue).
pub struct State {
    values: Vec<Option<Box<dyn Any>>>,
    store: u64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            store: NEXT_STORE.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl State {
    fn slot<V>(&self, key: Key<V>) -> Option<&(dyn Any + 'static)> {
        if key.store != self.store {
            return None;
        }
        self.values.get(key.index)?.as_deref()
    }

    /// Moves `value` into the store.
    #[must_use = "the value cannot be reached without its key"]
    pub fn insert<V: 'static>(&mut self, value: V) -> Key<V> {
        self.values.push(Some(Box::new(value)));
        Key {
            index: self.values.len() - 1,
            store: self.store,
            _marker: PhantomData,
        }
    }

    /// Takes the value out of the store. The key stays valid but finds nothing afterwards.
    pub fn remove<V: 'static>(&mut self, key: Key<V>) -> Option<V> {
        if key.store != self.store {
            return None;
        }
        let value = self.values.get_mut(key.index)?.take()?;
        value.downcast::<V>().ok().map(|value| *value)
    }

    /// Borrows the value, if it is still in the store.
    #[must_use]
    pub fn get<V: 'static>(&self, key: Key<V>) -> Option<&V> {
        self.slot(key)?.downcast_ref::<V>()
    }

    /// Mutably borrows the value, if it is still in the store.
    #[must_use]
    pub fn get_mut<V: 'static>(&mut self, key: Key<V>) -> Option<&mut V> {
        if key.store != self.store {
            return None;
        }
        self.values
            .get_mut(key.index)?
            .as_deref_mut()?
            .downcast_mut::<V>()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut state = State::default();

        let counter = state.insert(1_u64);
        let names = state.insert(vec![String::from("S")]);
        *state.get_mut(counter).unwrap() += 1;
        state.get_mut(names).unwrap().push(String::from("T"));

        assert_eq!(state.get(counter), Some(&2));
        assert_eq!(state.remove(counter), Some(2));
        assert_eq!(state.remove(counter), None);
        assert_eq!(state.get(counter), None);
        assert_eq!(
            state.remove(names),
            Some(vec![String::from("S"), String::from("T")])
        );
        assert_eq!(state.get_mut(names), None);
    }

    #[test]
    fn test_foreign_keys_find_nothing() {
        let mut first = State::default();
        let mut second = State::default();
        let key = first.insert(String::from("medium"));
        let other = second.insert(String::from("other"));
        assert_eq!(key.index, other.index);
        assert_eq!(second.get(key), None);
        assert_eq!(second.get_mut(key), None);
        assert_eq!(second.remove(key), None);
        assert_eq!(second.get(other).map(String::as_str), Some("other"));
        assert_eq!(first.remove(key).as_deref(), Some("medium"));
    }
}
