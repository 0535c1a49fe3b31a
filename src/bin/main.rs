use cordyceps_avl::AvlSet;

fn main() {
    let mut set = AvlSet::new();

    for key in [10, 20, 30, 40, 50] {
        set.add(key);
        set.assert_invariants();
        println!("add {key}: {set:?}");
    }

    assert_eq!(set.search(20).map(|node| node.balance_factor()), Some(1));

    set.remove(10);
    set.assert_invariants();
    println!("remove 10: {set:?}");

    let mut graph = String::new();
    set.dotgraph("demo", &mut graph).unwrap();
    println!("{graph}");
}
