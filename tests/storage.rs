//! File formats, exercised through temporary files

use rse::rng::seeded;
use rse::storage::{self, RecordLayout};
use rse::{
    Alphabet, EncodedVector, FrequencyProfile, QGramMode, QGramSet, ReferenceSet, ReferenceSetGenerator, ReferenceValue,
    RseError,
};
use std::fs;
use tempfile::tempdir;

#[test]
fn reference_set_file_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ref.txt");
    let set = ReferenceSetGenerator::new(Alphabet::lowercase(), 4)
        .generate(20, &mut seeded(1))
        .unwrap();
    storage::write_reference_set(&set, &path).unwrap();
    let back = storage::read_reference_set(&path).unwrap();
    assert_eq!(back, set);
    assert_eq!(back.fingerprint(), set.fingerprint());
}

#[test]
fn reference_values_keep_trailing_whitespace() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ref.txt");
    let set = ReferenceSet::from_values(vec![
        ReferenceValue::new(" ab"),
        ReferenceValue::new("b a"),
        ReferenceValue::new("ab\t"),
        ReferenceValue::new("ba "),
    ])
    .unwrap();
    storage::write_reference_set(&set, &path).unwrap();
    assert_eq!(storage::read_reference_set(&path).unwrap(), set);
}

#[test]
fn reference_set_file_is_validated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ref.txt");

    fs::write(&path, "abc\nxyz\n\n\n").unwrap();
    assert_eq!(storage::read_reference_set(&path).unwrap().len(), 2);

    fs::write(&path, "abc\n\nxyz\n").unwrap();
    assert!(matches!(
        storage::read_reference_set(&path),
        Err(RseError::Parse { line: 2, .. })
    ));

    fs::write(&path, "abc\nabcd\n").unwrap();
    assert!(storage::read_reference_set(&path).unwrap_err().is_configuration());

    fs::write(&path, "abc\nabc\n").unwrap();
    assert!(storage::read_reference_set(&path).is_err());
}

#[test]
fn profile_file_roundtrip_and_comments() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("profile.csv");
    let mut profile = FrequencyProfile::new();
    profile.insert("an", 12.0);
    profile.insert("na", 3.0);
    profile.insert(",a", 1.0);
    storage::write_profile(&profile, &path).unwrap();
    assert_eq!(storage::read_profile(&path).unwrap(), profile);

    fs::write(&path, "# header\nab,2\n\nab,3\ncd, 1.5\n").unwrap();
    let p = storage::read_profile(&path).unwrap();
    assert_eq!(p.count("ab"), 5.0);
    assert_eq!(p.count("cd"), 1.5);

    fs::write(&path, "ab,two\n").unwrap();
    assert!(matches!(storage::read_profile(&path), Err(RseError::Parse { line: 1, .. })));
}

#[test]
fn record_file_normalises_skips_and_deduplicates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("people.csv");
    fs::write(
        &path,
        "id,first,last,city\n\
         1,Anna ,Smith,Oslo\n\
         2,\"Mc Donald, Jr\",Lee,Rome\n\
         3,,Brown,Lima\n\
         4,X,Y,Nice\n\
         1,Anne,Smith,Oslo\n",
    )
    .unwrap();

    let loaded = storage::read_records(&path, &RecordLayout::new(vec![1, 2], 2)).unwrap();
    assert_eq!(loaded.headers, vec!["first", "last"]);
    assert_eq!(loaded.skipped, 2); // blank attribute, no q-grams
    assert_eq!(loaded.duplicates, 1);

    let ids: Vec<&str> = loaded.records.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
    // later row wins
    assert!(loaded.records[0].1.contains("ne"));
    assert!(!loaded.records[0].1.contains("na"));
    // whitespace removed, punctuation kept
    assert!(loaded.records[1].1.contains("cd"));
    assert!(loaded.records[1].1.contains(",j"));
}

#[test]
fn record_file_with_other_delimiter() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("people.tsv");
    fs::write(&path, "name\tid\nPeter\tp1\n").unwrap();
    let layout = RecordLayout {
        id_column: 1,
        delimiter: '\t',
        ..RecordLayout::new(vec![0], 2)
    };
    let loaded = storage::read_records(&path, &layout).unwrap();
    assert_eq!(loaded.records[0].0, "p1");
    assert_eq!(loaded.records[0].1.len(), 4);

    let short = RecordLayout::new(vec![5], 2);
    assert!(storage::read_records(&path, &short).is_err());
}

#[test]
fn qgram_set_file_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("qgrams.tsv");
    let records = vec![
        ("r1".to_owned(), QGramSet::from_token("anna", 2, QGramMode::Multiset)),
        ("r2".to_owned(), QGramSet::from_token("aaaa", 2, QGramMode::Multiset)),
    ];
    storage::write_qgram_sets(&records, &path).unwrap();
    assert_eq!(storage::read_qgram_sets(&path, QGramMode::Multiset).unwrap(), records);

    let collapsed = storage::read_qgram_sets(&path, QGramMode::Set).unwrap();
    assert_eq!(collapsed[0].1.total(), 3);
    assert_eq!(collapsed[1].1.total(), 1);
    assert_eq!(records[1].1.total(), 3);
}

#[test]
fn encoding_files_roundtrip_in_both_formats() {
    let dir = tempdir().unwrap();
    let encodings = vec![
        ("a".to_owned(), EncodedVector::from_positions(70, [0, 3, 69]).unwrap()),
        ("b,c".to_owned(), EncodedVector::zeros(70)),
    ];

    let text = dir.path().join("enc.txt");
    storage::write_encodings_text(&encodings, &text).unwrap();
    let first_line = fs::read_to_string(&text).unwrap().lines().next().unwrap().to_owned();
    assert!(first_line.starts_with("a,1001"));
    assert_eq!(storage::read_encodings_text(&text).unwrap(), encodings);

    let bin = dir.path().join("enc.bin");
    storage::write_encodings_bincode(&encodings, &bin).unwrap();
    assert_eq!(storage::read_encodings_bincode(&bin).unwrap(), encodings);
}

#[test]
fn malformed_bincode_encoding_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("enc.bin");
    // same wire layout as an encoding: id, then length and packed words
    let forged: Vec<(String, (u64, Vec<u64>))> = vec![("1".to_owned(), (200, Vec::new()))];
    fs::write(&path, bincode::serialize(&forged).unwrap()).unwrap();
    assert!(matches!(
        storage::read_encodings_bincode(&path),
        Err(RseError::Serialization(_))
    ));

    let stray: Vec<(String, (u64, Vec<u64>))> = vec![("1".to_owned(), (4, vec![1 << 10]))];
    fs::write(&path, bincode::serialize(&stray).unwrap()).unwrap();
    assert!(storage::read_encodings_bincode(&path).is_err());
}
