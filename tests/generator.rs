//! Reference set generation

use rse::rng::{from_phrase, seeded};
use rse::{Alphabet, ReferenceSetGenerator};
use std::collections::HashSet;

#[test]
fn small_alphabet_scenario() {
    let alphabet = Alphabet::new("abc").unwrap();
    let set = ReferenceSetGenerator::new(alphabet.clone(), 3)
        .generate(4, &mut seeded(42))
        .unwrap();

    assert_eq!(set.len(), 4);
    let distinct: HashSet<&str> = set.iter().map(|v| v.as_str()).collect();
    assert_eq!(distinct.len(), 4);
    for v in &set {
        assert_eq!(v.len(), 3);
        assert!(alphabet.covers(v.as_str()));
    }

    let again = ReferenceSetGenerator::new(alphabet, 3)
        .generate(4, &mut seeded(42))
        .unwrap();
    assert_eq!(set, again);
    assert_eq!(set.fingerprint(), again.fingerprint());
}

#[test]
fn different_seeds_give_different_sets() {
    let g = ReferenceSetGenerator::new(Alphabet::lowercase(), 5);
    let a = g.generate(100, &mut seeded(1)).unwrap();
    let b = g.generate(100, &mut seeded(2)).unwrap();
    assert_ne!(a.fingerprint(), b.fingerprint());
}

#[test]
fn phrase_seeded_generation_is_shared() {
    let g = ReferenceSetGenerator::new(Alphabet::from_classes(true, true, false).unwrap(), 4);
    let party_a = g.generate(50, &mut from_phrase("linkage 2024")).unwrap();
    let party_b = g.generate(50, &mut from_phrase("linkage 2024")).unwrap();
    assert_eq!(party_a, party_b);
}

#[test]
fn capacity_is_checked_before_sampling() {
    let g = ReferenceSetGenerator::new(Alphabet::new("xy").unwrap(), 3);
    let err = g.generate(9, &mut seeded(0)).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("8"));
    // exactly the whole space is fine
    assert_eq!(g.generate(8, &mut seeded(0)).unwrap().len(), 8);
}

#[test]
fn values_are_drawn_over_the_whole_alphabet() {
    let alphabet = Alphabet::new("abcd").unwrap();
    let set = ReferenceSetGenerator::new(alphabet.clone(), 6)
        .generate(200, &mut seeded(5))
        .unwrap();
    let used: HashSet<char> = set.iter().flat_map(|v| v.as_str().chars()).collect();
    assert_eq!(used.len(), alphabet.len());
}

#[test]
fn covering_set_holds_every_bigram_twice() {
    let alphabet = Alphabet::lowercase();
    let g = ReferenceSetGenerator::new(alphabet.clone(), 4);
    let set = g.generate_covering(2, 2, 500, &mut seeded(21)).unwrap();
    assert!(set.len() >= 500);
    assert_eq!(set.value_len(), 4);

    for gram in alphabet.enumerate(2).unwrap() {
        let holders = set.iter().filter(|v| v.qgrams(2).contains(&gram)).count();
        assert!(holders >= 2, "{gram} occurs in {holders} values");
    }

    let again = g.generate_covering(2, 2, 500, &mut seeded(21)).unwrap();
    assert_eq!(set, again);
}
