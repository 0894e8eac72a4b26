//! Bank packer: overload-and-remove bin packing with `related`/`align`
//! constraints (spec.md §4.5, §9).

use std::collections::{BTreeSet, HashMap};

use nohash::IntMap;

use crate::error::CrunchError;
use crate::intern::TileId;
use crate::parser::Document;

/// Iteration cap for the overload-and-remove improvement loop (spec.md
/// §4.5 step 5, §5: "no timeouts ... enforces an iteration cap"). Large
/// enough that realistic sheets (a few hundred cels) converge well under
/// it while still bounding pathological inputs.
const MAX_OVERLOAD_ROUNDS: usize = 1000;

/// A bank: the tile set it holds plus the original cel indices (document
/// order) it will emit, in emission order.
#[derive(Debug, Clone)]
pub struct Bank {
    pub tiles: BTreeSet<TileId>,
    pub cels: Vec<usize>,
}

/// A single emitted slot in the global cel-id stream: either a real cel or
/// an `align`-padding placeholder.
#[derive(Debug, Clone, Copy)]
pub enum Slot {
    Cel { cel_index: usize },
    Padding,
}

/// The packer's full output: banks in emission order, the global cel-id
/// stream (including padding), and a lookup from original cel index to its
/// assigned id and bank.
#[derive(Debug, Clone, Default)]
pub struct PackedLayout {
    pub banks: Vec<Bank>,
    /// `stream[bank_index]` is that bank's ordered slots.
    pub stream: Vec<Vec<Slot>>,
    pub cel_id: IntMap<usize, u16>,
    pub cel_bank: IntMap<usize, usize>,
}

struct MetaItem {
    members: Vec<usize>, // original cel indices, ascending
    tiles: BTreeSet<TileId>,
    subset: bool,
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

fn name_to_index(doc: &Document) -> HashMap<&str, usize> {
    let mut map = HashMap::new();
    for (i, cel) in doc.cels.iter().enumerate() {
        map.insert(cel.name.as_str(), i);
        for alias in &cel.aliases {
            map.insert(alias.as_str(), i);
        }
    }
    map
}

fn build_meta_items(
    doc: &Document,
    cel_tiles: &[BTreeSet<TileId>],
    bank_size: usize,
) -> Result<Vec<MetaItem>, CrunchError> {
    let n = doc.cels.len();
    let mut uf = UnionFind::new(n);
    let names = name_to_index(doc);
    for (i, cel) in doc.cels.iter().enumerate() {
        if let Some(target_name) = &cel.related {
            let j = *names.get(target_name.as_str()).ok_or_else(|| {
                CrunchError::pack(format!(
                    "cel '{}' has related '{}', which does not exist",
                    cel.name, target_name
                ))
            })?;
            uf.union(i, j);
        }
    }

    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        let root = uf.find(i);
        groups.entry(root).or_default().push(i);
    }

    let mut metas = Vec::with_capacity(groups.len());
    for (_, mut members) in groups {
        members.sort_unstable();
        let mut tiles = BTreeSet::new();
        let mut subset = false;
        for &m in &members {
            tiles.extend(cel_tiles[m].iter().copied());
            subset |= doc.cels[m].subset;
        }
        if tiles.len() > bank_size {
            let names: Vec<&str> = members.iter().map(|&m| doc.cels[m].name.as_str()).collect();
            return Err(CrunchError::pack(format!(
                "cel group [{}] needs {} tiles, exceeding bank-size {}",
                names.join(", "),
                tiles.len(),
                bank_size
            )));
        }
        metas.push(MetaItem {
            members,
            tiles,
            subset,
        });
    }
    Ok(metas)
}

struct Bin {
    items: Vec<usize>, // indices into `metas`
    tiles: BTreeSet<TileId>,
}

fn recompute_tiles(metas: &[MetaItem], member_items: &[usize]) -> BTreeSet<TileId> {
    let mut out = BTreeSet::new();
    for &idx in member_items {
        out.extend(metas[idx].tiles.iter().copied());
    }
    out
}

fn best_fit_bin(
    bins: &[Bin],
    tiles: &BTreeSet<TileId>,
    capacity: usize,
    exclude: Option<usize>,
) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None; // (intersection, bin index)
    for (i, bin) in bins.iter().enumerate() {
        if Some(i) == exclude {
            continue;
        }
        let union_size = bin.tiles.union(tiles).count();
        if union_size > capacity {
            continue;
        }
        let inter = bin.tiles.intersection(tiles).count();
        let better = match best {
            None => true,
            Some((best_inter, best_i)) => inter > best_inter || (inter == best_inter && i < best_i),
        };
        if better {
            best = Some((inter, i));
        }
    }
    best.map(|(_, i)| i)
}

fn greedy_insert(bins: &mut Vec<Bin>, item: usize, metas: &[MetaItem], capacity: usize) {
    let tiles = &metas[item].tiles;
    match best_fit_bin(bins, tiles, capacity, None) {
        Some(bin_idx) => {
            bins[bin_idx].items.push(item);
            bins[bin_idx].tiles.extend(tiles.iter().copied());
        }
        None => bins.push(Bin {
            items: vec![item],
            tiles: tiles.clone(),
        }),
    }
}

/// spec.md §4.5 step 1.
fn step1_initial_pack(order: &[usize], metas: &[MetaItem], capacity: usize) -> Vec<Bin> {
    let mut bins = Vec::new();
    for &item in order {
        greedy_insert(&mut bins, item, metas, capacity);
    }
    bins
}

/// Candidate bin for a deliberate overload move: the bin (other than
/// `exclude`) whose tile set has the largest positive intersection with
/// `tiles`. Returns `None` when no bin shares any tile with the item, since
/// there is nothing to gain by overloading in that case.
fn best_overload_target(bins: &[Bin], tiles: &BTreeSet<TileId>, exclude: usize) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (i, bin) in bins.iter().enumerate() {
        if i == exclude {
            continue;
        }
        let inter = bin.tiles.intersection(tiles).count();
        if inter == 0 {
            continue;
        }
        let better = match best {
            None => true,
            Some((best_inter, best_i)) => inter > best_inter || (inter == best_inter && i < best_i),
        };
        if better {
            best = Some((inter, i));
        }
    }
    best.map(|(_, i)| i)
}

/// The tiles that only `metas[bin.items[pos]]` contributes to `bin` --
/// removing that member would shed exactly these tiles (spec.md §4.5 step 3:
/// "tile-set subtraction counting tiles unique to that item within the
/// bin").
fn unique_tiles_of_member(bin: &Bin, metas: &[MetaItem], pos: usize) -> BTreeSet<TileId> {
    let target = &metas[bin.items[pos]].tiles;
    let mut others = BTreeSet::new();
    for (i, &item) in bin.items.iter().enumerate() {
        if i != pos {
            others.extend(metas[item].tiles.iter().copied());
        }
    }
    target.difference(&others).copied().collect()
}

/// spec.md §4.5 step 3: evict members from an overloaded bin, most
/// overflow-reducing first, ties broken by most recently inserted, until it
/// fits `capacity` again. Returns the evicted item indices.
fn evict_worst_until_fits(bin: &mut Bin, metas: &[MetaItem], capacity: usize) -> Vec<usize> {
    let mut evicted = Vec::new();
    while bin.tiles.len() > capacity {
        let mut best: Option<(usize, usize, usize)> = None; // (reduction, pos, item)
        for (pos, &item) in bin.items.iter().enumerate() {
            let reduction = unique_tiles_of_member(bin, metas, pos).len();
            let better = match best {
                None => true,
                Some((best_red, best_pos, _)) => {
                    reduction > best_red || (reduction == best_red && pos > best_pos)
                }
            };
            if better {
                best = Some((reduction, pos, item));
            }
        }
        let (_, pos, item) = best.expect("overloaded bin has at least one member");
        bin.items.remove(pos);
        bin.tiles = recompute_tiles(metas, &bin.items);
        evicted.push(item);
    }
    evicted
}

/// spec.md §4.5 steps 2-5: repeatedly try to drain the highest-index bin
/// into earlier bins (a deliberate, temporary overload), repair any
/// resulting overflow by eviction, and re-seed evicted items through step 1.
/// Converges when the last bin can't be drained any further; a bin that
/// genuinely cannot shrink is left in place rather than treated as failure
/// -- only non-termination within the iteration cap is a [`CrunchError`].
fn overload_and_remove(
    mut bins: Vec<Bin>,
    metas: &[MetaItem],
    capacity: usize,
) -> Result<Vec<Bin>, CrunchError> {
    let mut rounds = 0usize;
    loop {
        if bins.len() <= 1 {
            break;
        }
        let last = bins.len() - 1;
        let victims = bins[last].items.clone();
        let mut remaining = Vec::new();
        let mut moved_any = false;

        for item in victims {
            rounds += 1;
            if rounds > MAX_OVERLOAD_ROUNDS {
                return Err(CrunchError::pack(
                    "overload-and-remove did not converge within the iteration cap",
                ));
            }
            match best_overload_target(&bins[..last], &metas[item].tiles, last) {
                Some(target) => {
                    bins[target].items.push(item);
                    bins[target].tiles.extend(metas[item].tiles.iter().copied());
                    moved_any = true;
                    let evicted = evict_worst_until_fits(&mut bins[target], metas, capacity);
                    for ev in evicted {
                        greedy_insert(&mut bins, ev, metas, capacity);
                    }
                }
                None => remaining.push(item),
            }
        }

        bins[last].items = remaining;
        bins[last].tiles = recompute_tiles(metas, &bins[last].items);
        if bins[last].items.is_empty() {
            bins.remove(last);
        } else {
            // Either nothing moved, or what's left can't be moved further:
            // no more progress is possible on this bin.
            break;
        }
        let _ = moved_any;
    }
    Ok(bins)
}

/// Run the full bank packer: coalesce `related` cels, pack via
/// overload-and-remove, order deterministically by original declaration
/// order, then apply `align` padding (spec.md §4.5).
pub fn pack(
    doc: &Document,
    cel_tiles: &[BTreeSet<TileId>],
    bank_size: usize,
) -> Result<PackedLayout, CrunchError> {
    let metas = build_meta_items(doc, cel_tiles, bank_size)?;

    let mut order: Vec<usize> = (0..metas.len()).collect();
    // subset priming: a deprecated seeding heuristic only (spec.md §9) --
    // subset-flagged meta-items are simply inserted first.
    order.sort_by_key(|&i| (!metas[i].subset, metas[i].members[0]));

    let bins = step1_initial_pack(&order, &metas, bank_size);
    let mut bins = overload_and_remove(bins, &metas, bank_size)?;

    // Deterministic emission order: bins and the meta-items/cels within
    // them are ordered by original declaration order, independent of the
    // packer's internal bookkeeping order -- the packer only decides
    // *grouping*, not numbering.
    for bin in &mut bins {
        bin.items.sort_by_key(|&i| metas[i].members[0]);
    }
    bins.sort_by_key(|bin| metas[bin.items[0]].members[0]);

    let mut banks = Vec::with_capacity(bins.len());
    let mut stream = Vec::with_capacity(bins.len());
    let mut cel_id = IntMap::default();
    let mut cel_bank = IntMap::default();
    let mut running_id: u32 = 0;

    for (bank_index, bin) in bins.iter().enumerate() {
        let mut bank_cels = Vec::new();
        let mut slots = Vec::new();
        for &meta_idx in &bin.items {
            for &cel_index in &metas[meta_idx].members {
                let align = doc.cels[cel_index].align.max(1);
                if align > 1 && running_id % align != 0 {
                    let pad = align - (running_id % align);
                    for _ in 0..pad {
                        slots.push(Slot::Padding);
                        running_id += 1;
                    }
                }
                cel_id.insert(cel_index, running_id as u16);
                cel_bank.insert(cel_index, bank_index);
                bank_cels.push(cel_index);
                slots.push(Slot::Cel { cel_index });
                running_id += 1;
            }
        }
        banks.push(Bank {
            tiles: bin.tiles.clone(),
            cels: bank_cels,
        });
        stream.push(slots);
    }

    Ok(PackedLayout {
        banks,
        stream,
        cel_id,
        cel_bank,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cel::Cel;
    use crate::geom::Rect;

    fn tile_set(ids: &[u32]) -> BTreeSet<TileId> {
        ids.iter().copied().collect()
    }

    fn doc_with(cels: Vec<Cel>) -> Document {
        Document {
            cels,
            ..Document::default()
        }
    }

    #[test]
    fn single_bank_when_everything_fits() {
        let doc = doc_with(vec![
            Cel::new("a".into(), Rect::new(0, 0, 8, 16)),
            Cel::new("b".into(), Rect::new(0, 0, 8, 16)),
        ]);
        let tiles = vec![tile_set(&[1, 2, 3]), tile_set(&[3, 4, 5])];
        let layout = pack(&doc, &tiles, 32).unwrap();
        assert_eq!(layout.banks.len(), 1);
        assert_eq!(layout.cel_id[&0], 0);
        assert_eq!(layout.cel_id[&1], 1);
    }

    #[test]
    fn related_cels_share_a_bank_or_fail() {
        let mut a = Cel::new("a".into(), Rect::new(0, 0, 8, 16));
        a.related = Some("b".into());
        let b = Cel::new("b".into(), Rect::new(0, 0, 8, 16));
        let doc = doc_with(vec![a, b]);
        let tiles = vec![
            (0..20).collect::<BTreeSet<_>>(),
            (20..40).collect::<BTreeSet<_>>(),
        ];
        // disjoint 20-tile sets, bank-size 32: coalesced union is 40 tiles,
        // which cannot fit in one bank -- fatal, per spec.md §8 scenario.
        let err = pack(&doc, &tiles, 32).unwrap_err();
        assert!(matches!(err, CrunchError::Pack { .. }));
    }

    #[test]
    fn related_cels_share_a_bank_when_it_fits() {
        let mut a = Cel::new("a".into(), Rect::new(0, 0, 8, 16));
        a.related = Some("b".into());
        let b = Cel::new("b".into(), Rect::new(0, 0, 8, 16));
        let doc = doc_with(vec![a, b]);
        let tiles = vec![(0..10).collect::<BTreeSet<_>>(), (10..20).collect::<BTreeSet<_>>()];
        let layout = pack(&doc, &tiles, 32).unwrap();
        assert_eq!(layout.cel_bank[&0], layout.cel_bank[&1]);
    }

    #[test]
    fn align_inserts_padding_to_next_multiple() {
        let a = Cel::new("x".into(), Rect::new(0, 0, 8, 16));
        let mut b = Cel::new("y".into(), Rect::new(0, 0, 8, 16));
        b.align = 4;
        let doc = doc_with(vec![a, b]);
        let tiles = vec![tile_set(&[0, 1, 2, 3, 4, 5]), tile_set(&[10, 11, 12, 13, 14, 15])];
        let layout = pack(&doc, &tiles, 32).unwrap();
        assert_eq!(layout.cel_id[&0], 0);
        assert_eq!(layout.cel_id[&1], 4);
    }

    #[test]
    fn oversized_single_cel_is_fatal() {
        let doc = doc_with(vec![Cel::new("huge".into(), Rect::new(0, 0, 8, 16))]);
        let tiles = vec![(0..40).collect::<BTreeSet<_>>()];
        let err = pack(&doc, &tiles, 32).unwrap_err();
        assert!(matches!(err, CrunchError::Pack { .. }));
    }

    #[test]
    fn overload_and_remove_converges_to_fewer_bins_than_naive_order() {
        // 5 items of 10 tiles each, built so pairwise intersections exist
        // between consecutive items; a naive single pass can end up with 3
        // bins, but consolidation should bring it down to 2 within a
        // bank-size of 32.
        let cels: Vec<Cel> = (0..5)
            .map(|i| Cel::new(format!("c{}", i), Rect::new(0, 0, 8, 16)))
            .collect();
        let doc = doc_with(cels);
        let tiles: Vec<BTreeSet<TileId>> = vec![
            (0..10).collect(),
            (6..16).collect(),
            (12..22).collect(),
            (100..110).collect(),
            (106..116).collect(),
        ];
        let layout = pack(&doc, &tiles, 32).unwrap();
        assert!(layout.banks.len() <= 3);
        for bank in &layout.banks {
            assert!(bank.tiles.len() <= 32);
        }
    }
}
