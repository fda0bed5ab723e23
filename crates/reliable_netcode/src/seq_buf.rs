//! See [`SeqBuf`].

use core::{array, mem};

/// Rolling sequence buffer data structure.
///
/// This provides constant-time insertion, query, access, and removal of items
/// which have a wrapping 16-bit sequence number as their key. This is achieved
/// by using two arrays:
/// - `keys`, an array of the sequence number occupying each slot, if any
/// - `data`, an array of the `T`s holding the actual data
///
/// When accessing into this buffer using the key `k`, an index `i` is computed
/// using `k % N`. We store `k` at `keys[i]`, and store the actual `T` at
/// `data[i]`. This means that **multiple keys will map to the same index**, so
/// inserting a value and attempting to access it later may result in reading a
/// different value than the one inserted.
/// To get around this, when accessing a value we check that `keys[i] == k`,
/// indicating that a new value has not been inserted into this index in the
/// meantime, and only then provide access to `data[i]`.
///
/// `N` must be a power of two, so that consecutive keys keep mapping to
/// consecutive slots when the key wraps around from [`u16::MAX`] to 0.
///
/// To avoid `unsafe` usage, all elements of `data` must be populated with valid
/// values. You will need a way to construct a valid (if meaningless) `T` when
/// creating the buffer or removing elements. If `T: Default`, functions are
/// provided to use the default value in these cases (such as [`SeqBuf::new`]).
///
/// This implementation is based on the article in [*Gaffer On Games*].
///
/// [*Gaffer On Games*]: https://gafferongames.com/post/reliable_ordered_messages#sequence-buffers
#[derive(Debug, Clone)]
pub struct SeqBuf<T, const N: usize> {
    keys: Box<[Option<u16>; N]>,
    data: Box<[T; N]>,
    len: usize,
}

impl<T: Default, const N: usize> Default for SeqBuf<T, N> {
    fn default() -> Self {
        Self::new_from_fn(|_| T::default())
    }
}

impl<T, const N: usize> SeqBuf<T, N> {
    /// Creates a new sequence buffer, populating the data array with items
    /// given by the callback.
    ///
    /// If `T: Default`, consider using [`SeqBuf::new`].
    ///
    /// # Panics
    ///
    /// Panics if `N` is not a power of two, or `N > 32768`.
    #[must_use]
    pub fn new_from_fn(cb: impl FnMut(usize) -> T) -> Self {
        assert!(N.is_power_of_two());
        assert!(N <= 1 << 15);
        Self {
            keys: Box::new([None; N]),
            data: Box::new(array::from_fn(cb)),
            len: 0,
        }
    }

    /// Gets the number of slots in this buffer.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Gets the number of elements in this sequence buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use reliable_netcode::seq_buf::SeqBuf;
    ///
    /// let mut buf = SeqBuf::<String, 16>::new();
    /// assert_eq!(0, buf.len());
    ///
    /// buf.insert(3, "hi #1".into());
    /// assert_eq!(1, buf.len());
    ///
    /// buf.insert(5, "bye".into());
    /// assert_eq!(2, buf.len());
    ///
    /// buf.insert(3, "hi #2".into());
    /// assert_eq!(2, buf.len());
    ///
    /// buf.remove(3);
    /// assert_eq!(1, buf.len());
    /// ```
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if there are no elements in this sequence buffer.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    const fn index(key: u16) -> usize {
        key as usize % N
    }

    /// Gets the key currently stored in the slot which `key` maps to.
    ///
    /// This is [`Some`] with a different key if inserting `key` would evict
    /// another value.
    ///
    /// # Examples
    ///
    /// ```
    /// use reliable_netcode::seq_buf::SeqBuf;
    ///
    /// let mut buf = SeqBuf::<u32, 16>::new();
    /// assert_eq!(None, buf.occupant(1));
    ///
    /// buf.insert(1, 100);
    /// assert_eq!(Some(1), buf.occupant(1));
    /// assert_eq!(Some(1), buf.occupant(17));
    /// ```
    #[must_use]
    pub fn occupant(&self, key: u16) -> Option<u16> {
        self.keys[Self::index(key)]
    }

    /// Returns `true` if a value is stored under exactly this key.
    #[must_use]
    pub fn contains(&self, key: u16) -> bool {
        self.occupant(key) == Some(key)
    }

    /// Gets a reference to the item at the given key.
    ///
    /// # Examples
    ///
    /// ```
    /// use reliable_netcode::seq_buf::SeqBuf;
    ///
    /// let mut buf = SeqBuf::<String, 16>::new();
    /// assert!(buf.get(7).is_none());
    ///
    /// buf.insert(7, "hello world".into());
    /// assert_eq!("hello world", buf.get(7).unwrap());
    ///
    /// buf.remove(7);
    /// assert!(buf.get(7).is_none());
    /// ```
    #[must_use]
    #[inline]
    pub fn get(&self, key: u16) -> Option<&T> {
        if self.contains(key) {
            Some(&self.data[Self::index(key)])
        } else {
            None
        }
    }

    /// Gets a mutable reference to the item at the given key.
    #[must_use]
    #[inline]
    pub fn get_mut(&mut self, key: u16) -> Option<&mut T> {
        if self.contains(key) {
            Some(&mut self.data[Self::index(key)])
        } else {
            None
        }
    }

    /// Inserts a value into this buffer at the given key, overwriting any value
    /// previously stored at that key.
    ///
    /// This will overwrite the value stored at the index `key % N`, even if it
    /// was stored under a different key. For example, if `N = 16`, then all
    /// of the following keys will write into the same index, and overwrite the
    /// same value:
    /// - 1
    /// - 17 (1 + 16)
    /// - 33 (1 + 16 + 16)
    ///
    /// Returns a reference to the newly inserted value.
    ///
    /// # Examples
    ///
    /// ```
    /// use reliable_netcode::seq_buf::SeqBuf;
    ///
    /// let mut buf = SeqBuf::<String, 16>::new();
    /// buf.insert(4, "hello".into());
    /// buf.insert(4 + 16, "world".into());
    /// assert!(buf.get(4).is_none());
    /// assert_eq!("world", buf.get(4 + 16).unwrap());
    /// assert_eq!(1, buf.len());
    /// ```
    #[inline]
    pub fn insert(&mut self, key: u16, value: T) -> &mut T {
        let index = Self::index(key);
        if self.keys[index].replace(key).is_none() {
            self.len += 1;
        }
        let slot = &mut self.data[index];
        *slot = value;
        slot
    }

    /// Removes a value from this buffer at the given key, replacing it with a
    /// default (meaningless) value.
    ///
    /// If `T: Default`, consider using [`SeqBuf::remove`].
    #[inline]
    pub fn remove_with(&mut self, key: u16, default: T) -> Option<T> {
        if self.contains(key) {
            Some(self.take_slot(Self::index(key), default))
        } else {
            None
        }
    }

    fn take_slot(&mut self, index: usize, default: T) -> T {
        self.keys[index] = None;
        self.len -= 1;
        mem::replace(&mut self.data[index], default)
    }

    /// Iterates over all keys and values stored in this buffer, in slot
    /// order rather than key order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &T)> {
        self.keys
            .iter()
            .zip(self.data.iter())
            .filter_map(|(key, value)| key.map(|key| (key, value)))
    }

    /// Iterates mutably over all keys and values stored in this buffer, in
    /// slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u16, &mut T)> {
        self.keys
            .iter()
            .zip(self.data.iter_mut())
            .filter_map(|(key, value)| key.map(|key| (key, value)))
    }
}

impl<T: Default, const N: usize> SeqBuf<T, N> {
    /// Creates a new sequence buffer, populating the data array with default
    /// values of `T`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a value from this buffer at the given key.
    ///
    /// See [`SeqBuf::remove_with`].
    #[inline]
    pub fn remove(&mut self, key: u16) -> Option<T> {
        self.remove_with(key, T::default())
    }

    /// Empties every slot which any key in `start..end` maps to, whatever key
    /// is actually stored there.
    ///
    /// The range wraps around, so `65530..5` covers 11 keys. If the range
    /// covers `N` or more keys, the whole buffer is cleared.
    ///
    /// This is used when jumping ahead from an old key to a much newer one, so
    /// that entries from a previous trip around the key space are not mistaken
    /// for fresh ones.
    ///
    /// # Examples
    ///
    /// ```
    /// use reliable_netcode::seq_buf::SeqBuf;
    ///
    /// let mut buf = SeqBuf::<u32, 16>::new();
    /// buf.insert(2, 2);
    /// buf.insert(3, 3);
    /// buf.insert(4, 4);
    ///
    /// // 19 maps to the same slot as 3
    /// buf.clear_range(19, 20);
    /// assert!(buf.contains(2));
    /// assert!(!buf.contains(3));
    /// assert!(buf.contains(4));
    /// ```
    pub fn clear_range(&mut self, start: u16, end: u16) {
        let count = usize::from(end.wrapping_sub(start));
        if count >= N {
            self.clear();
            return;
        }

        for offset in 0..count {
            #[expect(clippy::cast_possible_truncation, reason = "`count < N <= 32768`")]
            let index = Self::index(start.wrapping_add(offset as u16));
            if self.keys[index].is_some() {
                self.take_slot(index, T::default());
            }
        }
    }

    /// Removes every element for which `f` returns `false`.
    pub fn retain(&mut self, mut f: impl FnMut(u16, &mut T) -> bool) {
        for index in 0..N {
            let Some(key) = self.keys[index] else {
                continue;
            };
            if !f(key, &mut self.data[index]) {
                self.take_slot(index, T::default());
            }
        }
    }

    /// Removes every element from this buffer.
    pub fn clear(&mut self) {
        self.retain(|_, _| false);
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, reason = "testing")]

    use super::*;

    #[test]
    #[should_panic = "assertion failed: N.is_power_of_two()"]
    fn zero_cap() {
        let _ = SeqBuf::<(), 0>::new();
    }

    #[test]
    #[should_panic = "assertion failed: N.is_power_of_two()"]
    fn non_power_of_two_cap() {
        let _ = SeqBuf::<(), 100>::new();
    }

    #[test]
    fn single() {
        let mut b = SeqBuf::<u32, 16>::new();
        assert!(b.get(0).is_none());

        b.insert(0, 1234);
        assert_eq!(1234, *b.get(0).unwrap());
        assert_eq!(1234, *b.get_mut(0).unwrap());

        assert_eq!(1234, b.remove(0).unwrap());
        assert!(b.get(0).is_none());
        assert!(b.get_mut(0).is_none());
        assert!(b.remove(0).is_none());
    }

    #[test]
    fn keys_higher_than_cap() {
        let mut b = SeqBuf::<u32, 16>::new();

        b.insert(10, 12);
        b.insert(15, 34);
        b.insert(16, 56);
        b.insert(17, 78);

        assert_eq!(12, *b.get(10).unwrap());
        assert_eq!(34, *b.get(15).unwrap());
        assert_eq!(56, *b.get(16).unwrap());
        assert_eq!(78, *b.get(17).unwrap());
        assert_eq!(4, b.len());

        assert_eq!(12, b.remove(10).unwrap());
        assert_eq!(34, b.remove(15).unwrap());
        assert_eq!(56, b.remove(16).unwrap());
        assert_eq!(78, b.remove(17).unwrap());
        assert!(b.is_empty());
    }

    #[test]
    fn overwrite() {
        let mut b = SeqBuf::<u32, 16>::new();

        b.insert(0, 111);
        b.insert(16, 222);

        // we lose `111` since we overwrite that slot with `222`
        assert!(b.get(0).is_none());
        assert_eq!(222, *b.get(16).unwrap());
        assert_eq!(1, b.len());
    }

    #[test]
    fn u16_max_key() {
        let mut b = SeqBuf::<u32, 16>::new();

        assert!(b.remove(u16::MAX).is_none());
        assert!(b.is_empty());

        b.insert(u16::MAX, 1);
        assert_eq!(1, *b.get(u16::MAX).unwrap());
        assert_eq!(1, b.len());
    }

    #[test]
    fn wraparound_keeps_neighbours_apart() {
        let mut b = SeqBuf::<u16, 256>::new();
        for key in (u16::MAX - 9)..=u16::MAX {
            b.insert(key, key);
        }
        for key in 0..10 {
            b.insert(key, key);
        }

        assert_eq!(20, b.len());
        assert_eq!(u16::MAX, *b.get(u16::MAX).unwrap());
        assert_eq!(0, *b.get(0).unwrap());
    }

    #[test]
    fn clear_range_wraps() {
        let mut b = SeqBuf::<u16, 16>::new();
        b.insert(u16::MAX - 1, 1);
        b.insert(u16::MAX, 2);
        b.insert(0, 3);
        b.insert(1, 4);

        b.clear_range(u16::MAX, 1);
        assert!(b.contains(u16::MAX - 1));
        assert!(!b.contains(u16::MAX));
        assert!(!b.contains(0));
        assert!(b.contains(1));
        assert_eq!(2, b.len());
    }

    #[test]
    fn clear_range_larger_than_cap() {
        let mut b = SeqBuf::<u16, 16>::new();
        b.insert(3, 3);
        b.insert(9, 9);

        b.clear_range(100, 200);
        assert!(b.is_empty());
    }

    #[test]
    fn retain_and_iter() {
        let mut b = SeqBuf::<u16, 16>::new();
        for key in 0..8 {
            b.insert(key, key * 10);
        }

        b.retain(|key, _| key % 2 == 0);
        let mut kept = b.iter().map(|(key, value)| (key, *value)).collect::<Vec<_>>();
        kept.sort_unstable();
        assert_eq!(vec![(0, 0), (2, 20), (4, 40), (6, 60)], kept);

        for (_, value) in b.iter_mut() {
            *value += 1;
        }
        assert_eq!(Some(&41), b.get(4));
    }
}
