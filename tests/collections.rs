use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use thorn::Thorn;

fn collecting() -> (Thorn, Rc<RefCell<Vec<u8>>>) {
    struct Sink(Rc<RefCell<Vec<u8>>>);
    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
    let buf = Rc::new(RefCell::new(Vec::new()));
    let sink: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(Sink(buf.clone())));
    (Thorn::with_stdout(sink), buf)
}

fn output(buf: &Rc<RefCell<Vec<u8>>>) -> String {
    String::from_utf8(buf.borrow().clone()).unwrap()
}

#[test]
fn negative_start_slices_from_the_end_of_a_list() {
    let (mut thorn, out) = collecting();
    thorn.run("var a = [1, 2, 3]; print(a[-1:]);").unwrap();
    assert_eq!(output(&out), "[3]\n");
}

#[test]
fn negative_start_slices_from_the_end_of_a_string() {
    let (mut thorn, out) = collecting();
    thorn.run(r#"var s = "hello"; print(s[-2:]);"#).unwrap();
    assert_eq!(output(&out), "lo\n");
}

#[test]
fn full_slice_with_no_bounds_copies_the_whole_list() {
    let (mut thorn, out) = collecting();
    thorn.run("var a = [1, 2, 3]; print(a[:]);").unwrap();
    assert_eq!(output(&out), "[1, 2, 3]\n");
}
