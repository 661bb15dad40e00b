// Copyright 2024 The Mover Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use maplit::btreemap;
use mover_lib::migrate::MoveInfo;
use mover_lib::remote::LegacyHistory;
use mover_lib::remote::MemoryRemote;
use mover_lib::remote::PathEntry;
use mover_lib::remote::PathSnapshot;
use mover_lib::repos::Revision;
use testutils::b0;
use testutils::checked_out;

fn snapshot(entries: &[(&str, PathEntry)]) -> PathSnapshot {
    entries
        .iter()
        .map(|(path, entry)| ((*path).to_owned(), entry.clone()))
        .collect()
}

fn legacy_with_rename() -> LegacyHistory {
    // r1 creates A with a file; r2 renames A to X, recorded as a move.
    let r0 = PathSnapshot::new();
    let r1 = snapshot(&[
        ("A", PathEntry::Dir),
        ("A/f", PathEntry::File("one\n".into())),
    ]);
    let r2 = snapshot(&[
        ("X", PathEntry::Dir),
        ("X/f", PathEntry::File("one\n".into())),
    ]);
    LegacyHistory {
        snapshots: vec![r0, r1, r2],
        moves: btreemap! {
            Revision::new(2) => vec![MoveInfo {
                source: "A".to_owned(),
                target: "X".to_owned(),
                copyfrom_rev: Some(Revision::new(1)),
            }],
        },
    }
}

#[test]
fn migration_yields_one_revision_per_source_revision() {
    let remote = MemoryRemote::open("mem://legacy").with_legacy(legacy_with_rename());
    let mut wc = checked_out(remote);

    let created = wc
        .migrate(Revision::new(1), Revision::new(2))
        .unwrap();
    assert_eq!(created, vec![Revision::new(1), Revision::new(2)]);
    assert_eq!(wc.remote().repos().head(), Revision::new(2));

    let props = wc.remote().repos().revprops(Revision::new(2)).unwrap();
    assert_eq!(props.get("migrated-from").map(String::as_str), Some("2"));
}

#[test]
fn recorded_moves_keep_eids_across_renames() {
    let remote = MemoryRemote::open("mem://legacy").with_legacy(legacy_with_rename());
    let mut wc = checked_out(remote);
    wc.migrate(Revision::new(1), Revision::new(2)).unwrap();

    let repos = wc.remote().repos();
    let dir_before = repos
        .find_el_rev_by_path_rev(Revision::new(1), &b0(), "A")
        .unwrap()
        .unwrap();
    let dir_after = repos
        .find_el_rev_by_path_rev(Revision::new(2), &b0(), "X")
        .unwrap()
        .unwrap();
    assert_eq!(dir_before, dir_after);

    // The file rode along inside the moved directory.
    let file_before = repos
        .find_el_rev_by_path_rev(Revision::new(1), &b0(), "A/f")
        .unwrap()
        .unwrap();
    let file_after = repos
        .find_el_rev_by_path_rev(Revision::new(2), &b0(), "X/f")
        .unwrap()
        .unwrap();
    assert_eq!(file_before, file_after);

    // Payload is byte-identical across the move.
    let tree = repos.get_branch_by_id(Revision::new(2), &b0()).unwrap().tree();
    assert_eq!(
        tree.get(file_after).unwrap().payload.text().unwrap(),
        "one\n"
    );
}

#[test]
fn unrecorded_renames_fall_back_to_delete_plus_add() {
    let r0 = PathSnapshot::new();
    let r1 = snapshot(&[("f", PathEntry::File("data\n".into()))]);
    let r2 = snapshot(&[("g", PathEntry::File("data\n".into()))]);
    let legacy = LegacyHistory {
        snapshots: vec![r0, r1, r2],
        moves: btreemap! {},
    };
    let remote = MemoryRemote::open("mem://legacy").with_legacy(legacy);
    let mut wc = checked_out(remote);
    wc.migrate(Revision::new(1), Revision::new(2)).unwrap();

    let repos = wc.remote().repos();
    let before = repos
        .find_el_rev_by_path_rev(Revision::new(1), &b0(), "f")
        .unwrap()
        .unwrap();
    let after = repos
        .find_el_rev_by_path_rev(Revision::new(2), &b0(), "g")
        .unwrap()
        .unwrap();
    // Without a move record the new path is a new element.
    assert_ne!(before, after);
}
