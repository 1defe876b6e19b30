use natrix::ir::{Def, Expr, Imm, Program, Statement, Var, VarKind};
use natrix::symbols::{Linkage, SymbolKind};

fn lowered(src: &str) -> Program {
  match natrix::compile(src) {
    Ok(program) => program,
    Err(e) => panic!("failed to compile:\n{}", e.report(src)),
  }
}

fn targets(def: &Def) -> Vec<&Var> {
  def
    .body
    .code
    .iter()
    .filter_map(|stmt| match stmt {
      Statement::Assign { target, .. } => Some(target),
      _ => None,
    })
    .collect()
}

fn is_zero(stmt: &Statement) -> bool {
  matches!(
    stmt,
    Statement::Assign {
      value: Expr::Identity(Var {
        kind: VarKind::Immediate(Imm::Int(0)),
        ..
      }),
      ..
    }
  )
}

#[test]
fn every_byte_is_written_exactly_once() {
  let sources = [
    "int a[4] = {1, 2};",
    "char s[5] = \"Hi\";",
    "struct p { char c; int x; } v = {1, 2};",
    "union u { struct { int x; int y; } p; char q; } v = {{1, 2}, .q = 3};",
    "struct f { int a : 3; int b : 5; int c; } v = {.b = 1};",
    "int a[] = {[3] = 7, 1};",
    "struct p { int x; int y; } a[3] = {[1].y = 5};",
  ];
  for src in sources {
    let program = lowered(src);
    let def = &program.defs[0];
    let size = def.symbol.ty.size_of();
    let mut written = vec![0u8; size * 8];
    for target in targets(def) {
      let start = target.offset * 8 + usize::from(target.field_offset);
      let bits = if target.field_width > 0 {
        usize::from(target.field_width)
      } else {
        target.ty.size_of() * 8
      };
      for bit in &mut written[start..start + bits] {
        *bit += 1;
      }
    }
    assert!(
      written.iter().all(|&count| count == 1),
      "partial or duplicate coverage for `{src}`: {written:?}"
    );
  }
}

#[test]
fn assignments_are_emitted_in_layout_order() {
  let sources = [
    "struct p { int x; int y; int z; } v = {.z = 3, .x = 1, .y = 2};",
    "int a[4] = {[2] = 1, [0] = 2};",
    "struct f { int a : 3; int b : 5; } v = {.b = 1, .a = 2};",
  ];
  for src in sources {
    let program = lowered(src);
    let entries = targets(&program.defs[0])
      .iter()
      .map(|t| (t.offset, t.field_offset))
      .collect::<Vec<_>>();
    let mut sorted = entries.clone();
    sorted.sort();
    assert_eq!(entries, sorted, "out of layout order for `{src}`");
  }
}

#[test]
fn static_initializers_stay_load_time_pure() {
  let program = lowered(
    r#"
      int x = 5;
      int *p = &x;
      char *s = "hello";
      static long n = 1 << 20;
    "#,
  );
  assert_eq!(program.defs.len(), 4);
  for def in &program.defs {
    assert!(def.temps.is_empty());
    for stmt in &def.body.code {
      if let Statement::Assign { value, .. } = stmt {
        assert!(!value.is_call());
      }
    }
  }
}

#[test]
fn automatic_initializers_spill_calls_in_declaration_order() {
  let program = lowered(
    r#"
      int f(void);
      int g(void);
      int main(void) {
        int a[2] = {g(), f()};
        return a[0];
      }
    "#,
  );
  let main = &program.defs[0];
  assert_eq!(main.temps.len(), 2);
  // both spills precede the element stores they feed
  let code = &main.body.code;
  let spill = |name: &str| {
    code
      .iter()
      .position(|stmt| matches!(stmt, Statement::Assign { target, value, .. }
        if value.is_call() && target.symbol().name == name))
      .unwrap()
  };
  let store = code
    .iter()
    .position(|stmt| matches!(stmt, Statement::Assign { target, .. }
      if matches!(target.kind, VarKind::Direct(ref s) if s.name == "a")))
    .unwrap();
  assert!(spill("%t0") < spill("%t1"));
  assert!(spill("%t1") < store);
}

#[test]
fn unions_assign_at_most_one_member() {
  let program = lowered(
    "union u { struct { int x; int y; } p; int q; } v = {{1, 2}, .q = 3};",
  );
  let def = &program.defs[0];
  let values: Vec<_> = def.body.code.iter().filter(|stmt| !is_zero(stmt)).collect();
  assert_eq!(values.len(), 1);
  match values[0] {
    Statement::Assign { target, value } => {
      assert_eq!(target.offset, 0);
      assert!(matches!(
        value,
        Expr::Identity(Var {
          kind: VarKind::Immediate(Imm::Int(3)),
          ..
        })
      ));
    }
    _ => unreachable!(),
  }
}

#[test]
fn short_string_literals_are_padded_bytewise() {
  let program = lowered("char a[8] = \"hi\";");
  let def = &program.defs[0];
  let entries = targets(def);
  assert_eq!(entries[0].ty.len(), Some(3));
  let padded: usize = entries[1..].iter().map(|t| t.ty.size_of()).sum();
  assert_eq!(padded, 8 - 3);
  assert!(def.body.code[1..].iter().all(is_zero));
}

#[test]
fn anonymous_union_members_are_skipped_positionally() {
  let program = lowered(
    r#"
      struct s { union { int a; float b; }; int c; };
      struct s v = {1, 2};
    "#,
  );
  let def = &program.defs[0];
  let entries = targets(def);
  assert_eq!(entries.len(), 2);
  assert_eq!(entries[0].offset, 0);
  assert!(entries[0].ty.is_integer());
  assert_eq!(entries[1].offset, 4);
}

#[test]
fn flexible_arrays_are_sized_past_the_last_designator() {
  // C99 6.7.8p22: the trailing element lands one past the designated index
  let program = lowered("int a[] = {[3] = 7, 1};");
  let def = &program.defs[0];
  assert_eq!(def.symbol.ty.len(), Some(5));
  assert_eq!(def.symbol.ty.size_of(), 20);
}

#[test]
fn block_scope_statics_become_their_own_definitions() {
  let program = lowered(
    r#"
      int main(void) {
        static int counter = 1;
        int local = 2;
        return counter;
      }
    "#,
  );
  assert_eq!(program.defs.len(), 2);
  let counter = &program.defs[0];
  assert_eq!(counter.symbol.name, "counter");
  assert_eq!(counter.symbol.linkage, Linkage::Internal);
  assert!(matches!(counter.symbol.kind, SymbolKind::Definition));
  let main = &program.defs[1];
  assert_eq!(main.symbol.name, "main");
}
