use core::hash::Hash;
use im::{HashMap, Vector};

pub trait OrDefault<K, V> {
    fn get_or_default(&self, item: &K) -> V;
}

impl<K, V> OrDefault<K, V> for HashMap<K, V>
where
    K: Eq + PartialEq + Hash + Clone,
    V: Default + Clone,
{
    fn get_or_default(&self, item: &K) -> V {
        match self.get(item) {
            Some(v) => v.clone(),
            None => V::default(),
        }
    }
}

pub trait PushImmut<T> {
    fn push(&self, item: T) -> Vector<T>;
}

impl<T: Clone> PushImmut<T> for Vector<T> {
    fn push(&self, item: T) -> Vector<T> {
        let mut result = self.clone();
        result.push_back(item);
        result
    }
}

/// Adds `amount` to the running total for `key`, remembering the order keys were first seen.
pub fn accumulate<K, V>(
    (order, totals): (Vector<K>, HashMap<K, V>),
    key: K,
    amount: V,
) -> (Vector<K>, HashMap<K, V>)
where
    K: Eq + Hash + Clone,
    V: Default + Clone + std::ops::Add<Output = V>,
{
    let order = if totals.contains_key(&key) {
        order
    } else {
        order.push(key.clone())
    };
    let total = totals.get_or_default(&key) + amount;
    (order, totals.update(key, total))
}
